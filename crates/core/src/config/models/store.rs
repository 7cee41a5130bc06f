use serde::{Deserialize, Serialize};

/// 任务存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 执行任务体的工作线程数
    pub thread_count: usize,
    /// 超过计划触发时间多久视为错过触发（毫秒）
    pub misfire_threshold_ms: u64,
    /// 触发循环的最长空闲等待（毫秒）
    pub idle_wait_ms: u64,
    /// SQLite持久化地址，缺省时只保存在内存中
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            thread_count: 10,
            misfire_threshold_ms: 60_000,
            idle_wait_ms: 1_000,
            persistence_url: None,
        }
    }
}

impl StoreConfig {
    /// Validate store configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.thread_count == 0 {
            return Err(anyhow::anyhow!("工作线程数必须大于0"));
        }

        if self.idle_wait_ms == 0 {
            return Err(anyhow::anyhow!("空闲等待时间必须大于0"));
        }

        if let Some(url) = &self.persistence_url {
            if !url.starts_with("sqlite:") {
                return Err(anyhow::anyhow!("持久化地址必须是SQLite格式: {url}"));
            }
        }

        Ok(())
    }
}
