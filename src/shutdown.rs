use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 等待调度引擎排空的默认时长
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 排空阶段的结果
#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// 触发循环已停止，执行中的任务全部结束
    Drained,
    /// 调度引擎任务异常结束
    Failed(String),
    /// 超时，调度引擎任务被中止
    TimedOut,
}

/// 调度引擎的关闭流程
///
/// 先向订阅者广播关闭信号，[`crate::app::Application::run`] 收到后停止触发循环并等待工作池中的任务；
/// 再由 [`ShutdownManager::drain`] 在超时内等待引擎任务结束。关闭之后的订阅者会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    sender: Arc<Mutex<Option<broadcast::Sender<()>>>>,
    drain_timeout: Duration,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        match &*self.sender.lock().await {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                let _ = sender.send(());
                receiver
            }
        }
    }

    /// 广播关闭信号，重复调用无效
    pub async fn shutdown(&self) {
        let Some(sender) = self.sender.lock().await.take() else {
            debug!("关闭信号已经发送过");
            return;
        };
        debug!("通知 {} 个订阅者停止触发", sender.receiver_count());
        let _ = sender.send(());
        info!("关闭信号已发送");
    }

    pub async fn is_shutdown(&self) -> bool {
        self.sender.lock().await.is_none()
    }

    /// 等待调度引擎任务结束，超时后中止它
    pub async fn drain<T>(&self, mut handle: JoinHandle<T>) -> DrainOutcome {
        match tokio::time::timeout(self.drain_timeout, &mut handle).await {
            Ok(Ok(_)) => {
                info!("调度引擎已排空");
                DrainOutcome::Drained
            }
            Ok(Err(e)) => DrainOutcome::Failed(e.to_string()),
            Err(_) => {
                warn!(
                    "{} 秒内未能等到执行中的任务结束，强制退出",
                    self.drain_timeout.as_secs()
                );
                handle.abort();
                DrainOutcome::TimedOut
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_signal() {
        let manager = ShutdownManager::new();
        let mut first = manager.subscribe().await;
        let mut second = manager.clone().subscribe().await;

        manager.shutdown().await;

        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
        assert!(manager.is_shutdown().await);
    }

    #[tokio::test]
    async fn test_late_subscriber_is_signalled_immediately() {
        let manager = ShutdownManager::new();
        manager.shutdown().await;
        manager.shutdown().await;

        let mut late = manager.subscribe().await;
        let received = tokio::time::timeout(Duration::from_millis(100), late.recv()).await;
        assert!(matches!(received, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_drain_waits_for_engine() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe().await;
        let handle = tokio::spawn(async move {
            let _ = rx.recv().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        manager.shutdown().await;
        assert_eq!(manager.drain(handle).await, DrainOutcome::Drained);
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_timeout() {
        let manager = ShutdownManager::new().with_drain_timeout(Duration::from_millis(50));
        let handle = tokio::spawn(std::future::pending::<()>());

        manager.shutdown().await;
        assert_eq!(manager.drain(handle).await, DrainOutcome::TimedOut);
    }
}
