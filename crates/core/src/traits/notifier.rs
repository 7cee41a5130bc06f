/// 通知通道
///
/// 尽力而为、发出即忘。投递失败只能记录日志，不能影响调度的正确性。
pub trait Notifier: Send + Sync {
    fn push(&self, message: String);
}
