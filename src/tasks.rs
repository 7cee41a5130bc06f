use async_trait::async_trait;
use tracing::info;

use scheduler_core::traits::{ScheduledTask, TaskContext};
use scheduler_core::SchedulerResult;

/// 内置日志任务的任务类名
pub const LOG_TASK_CLASS: &str = "log";

/// 内置任务：把 `message` 参数写入日志
#[derive(Debug, Default, Clone)]
pub struct LogTask;

#[async_trait]
impl ScheduledTask for LogTask {
    async fn run(&self, context: &TaskContext) -> SchedulerResult<Option<String>> {
        let message = context.parameters.get_string("message").unwrap_or("(无消息)");
        info!(
            target: "scheduler::task",
            group = %context.key.group,
            task = %context.key.name,
            retry = context.retry_count,
            "{}",
            message
        );
        Ok(Some(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scheduler_core::{JobDataMap, TaskKey};

    #[tokio::test]
    async fn test_log_task_returns_message() {
        let mut parameters = JobDataMap::new();
        parameters.put("message", "你好");
        let context = TaskContext {
            key: TaskKey::new("job-1", "demo"),
            parameters,
            fire_time: Utc::now(),
            scheduled_fire_time: Utc::now(),
            retry_count: 0,
        };

        assert_eq!(LogTask.run(&context).await.unwrap().as_deref(), Some("你好"));
    }
}
