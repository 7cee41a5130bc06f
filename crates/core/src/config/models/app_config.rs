use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    audit::AuditConfig,
    observability::{IdGeneratorConfig, NotificationConfig, ObservabilityConfig},
    store::StoreConfig,
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub audit: AuditConfig,
    pub id_generator: IdGeneratorConfig,
    pub notification: NotificationConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: SCHEDULER_, nested keys separated by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // 1. Load config file if provided
        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            // Try to load default config files
            let default_paths = [
                "config/scheduler.toml",
                "scheduler.toml",
                "/etc/scheduler/config.toml",
            ];

            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        // 2. Environment variable overrides - highest priority
        builder = builder.add_source(
            Environment::with_prefix("SCHEDULER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.store.validate().context("任务存储配置验证失败")?;
        self.audit.validate().context("审计日志配置验证失败")?;
        self.id_generator.validate().context("ID生成器配置验证失败")?;
        self.notification.validate().context("通知配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditBackend;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.thread_count, 10);
        assert_eq!(config.store.misfire_threshold_ms, 60_000);
        assert_eq!(config.audit.backend, AuditBackend::Memory);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [store]
            thread_count = 4

            [audit]
            backend = "sqlite"
            database_url = "sqlite://audit.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.thread_count, 4);
        assert_eq!(config.store.idle_wait_ms, 1_000);
        assert_eq!(config.audit.backend, AuditBackend::Sqlite);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(AppConfig::from_toml("[store]\nthread_count = 0\n").is_err());
        assert!(AppConfig::from_toml("[audit]\nbackend = \"sqlite\"\n").is_err());
        assert!(AppConfig::from_toml("[observability]\nlog_level = \"loud\"\n").is_err());
        assert!(AppConfig::from_toml("[id_generator]\nmachine_id = 4096\n").is_err());
        assert!(AppConfig::from_toml("[store]\npersistence_url = \"postgres://x\"\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[store]\nmisfire_threshold_ms = 5000").unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.store.misfire_threshold_ms, 5000);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.store.thread_count, config.store.thread_count);
    }
}
