use tokio::sync::broadcast;
use tracing::{debug, info};

use scheduler_core::traits::Notifier;

/// 把通知写入日志的通知通道
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn push(&self, message: String) {
        info!(target: "scheduler::notification", "{}", message);
    }
}

/// 基于广播通道的通知
///
/// 没有订阅者或订阅者处理过慢时消息直接丢弃，不会阻塞调度。
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<String>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn push(&self, message: String) {
        if let Err(e) = self.sender.send(message) {
            debug!("通知没有订阅者，已丢弃: {}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.push("任务 a 执行失败".to_string());
        assert_eq!(rx.recv().await.unwrap(), "任务 a 执行失败");
    }

    #[test]
    fn test_push_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(1);
        notifier.push("nobody listens".to_string());
        TracingNotifier.push("logged".to_string());
    }
}
