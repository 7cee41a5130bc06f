use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{JobDataMap, TaskKey};
use crate::SchedulerResult;

/// 任务体执行时可见的上下文
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub key: TaskKey,
    pub parameters: JobDataMap,
    pub fire_time: DateTime<Utc>,
    pub scheduled_fire_time: DateTime<Utc>,
    /// 当前重试次数，首次执行为0
    pub retry_count: u32,
}

/// 可调度的任务实现
///
/// 超时控制由任务实现自己负责。成功时可返回一段日志文本写入审计记录。
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    async fn run(&self, context: &TaskContext) -> SchedulerResult<Option<String>>;
}
