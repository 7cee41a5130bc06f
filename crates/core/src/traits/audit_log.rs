use async_trait::async_trait;

use crate::models::AuditLog;
use crate::SchedulerResult;

/// 审计日志仓储接口
///
/// 只追加的执行记录，按 `(group_id, task_id)` 查询。读取与写入之间没有事务耦合，
/// 报表读到的数据可能稍有滞后。
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// 追加一条记录，返回带有生成ID的记录
    async fn append(&self, entry: &AuditLog) -> SchedulerResult<AuditLog>;

    /// 最近一条记录
    async fn most_recent(&self, group_id: &str, task_id: &str) -> SchedulerResult<Option<AuditLog>>;

    /// 执行总次数
    async fn count(&self, group_id: &str, task_id: &str) -> SchedulerResult<u64>;

    /// 失败次数（所有非成功的结果）
    async fn failures(&self, group_id: &str, task_id: &str) -> SchedulerResult<u64>;

    /// 按时间倒序返回最近的记录
    async fn find_by_task(
        &self,
        group_id: &str,
        task_id: &str,
        limit: usize,
    ) -> SchedulerResult<Vec<AuditLog>>;
}
