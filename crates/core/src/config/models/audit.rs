use serde::{Deserialize, Serialize};

/// 审计日志存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    Memory,
    Sqlite,
}

/// 审计日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub backend: AuditBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::Memory,
            database_url: None,
            max_connections: 5,
        }
    }
}

impl AuditConfig {
    /// Validate audit configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == AuditBackend::Sqlite {
            match &self.database_url {
                None => return Err(anyhow::anyhow!("SQLite审计日志必须配置数据库URL")),
                Some(url) if !url.starts_with("sqlite:") => {
                    return Err(anyhow::anyhow!("审计日志数据库URL必须是SQLite格式: {url}"));
                }
                Some(_) => {}
            }
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }

        Ok(())
    }
}
