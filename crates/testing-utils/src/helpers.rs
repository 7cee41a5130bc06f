//! 测试辅助工具

use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use scheduler_core::config::StoreConfig;

pub struct TestEnv;

impl TestEnv {
    /// 在超时前轮询等待条件成立
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        condition().await
    }

    /// 基于时间戳生成唯一名称
    pub fn unique_name(prefix: &str) -> String {
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        format!("{prefix}_{timestamp}")
    }

    /// 适合测试的存储配置：短空闲等待，少量工作线程
    pub fn store_config() -> StoreConfig {
        StoreConfig {
            thread_count: 4,
            misfire_threshold_ms: 60_000,
            idle_wait_ms: 20,
            persistence_url: None,
        }
    }
}
