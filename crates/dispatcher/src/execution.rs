use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::{debug, error, info, warn};

use scheduler_core::models::retry_policy::retry_count;
use scheduler_core::traits::{
    AuditLogRepository, JobExecutionContext, JobExecutor, Notifier, TaskContext,
};
use scheduler_core::{AuditLog, AuditOutcome, SchedulerError, SchedulerResult};

use crate::registry::TaskRegistry;
use crate::retry_service::{RetryDecision, RetryHandler};

/// 任务执行处理器
///
/// 由任务存储的工作池调用：查找任务实现并执行，写入审计日志，
/// 失败时在同一执行上下文中交给重试处理器决策。
pub struct TaskExecutionHandler {
    registry: Arc<TaskRegistry>,
    audit_log: Arc<dyn AuditLogRepository>,
    retry_handler: RetryHandler,
    notifier: Arc<dyn Notifier>,
}

impl TaskExecutionHandler {
    pub fn new(
        registry: Arc<TaskRegistry>,
        audit_log: Arc<dyn AuditLogRepository>,
        retry_handler: RetryHandler,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            audit_log,
            retry_handler,
            notifier,
        }
    }

    /// 审计日志写入失败只记录告警，不影响任务结果
    async fn record(&self, entry: AuditLog) {
        if let Err(e) = self.audit_log.append(&entry).await {
            warn!(
                "写入任务 {}.{} 的审计日志失败: {}",
                entry.group_id, entry.task_id, e
            );
        }
    }
}

#[async_trait]
impl JobExecutor for TaskExecutionHandler {
    async fn execute(&self, context: JobExecutionContext) -> SchedulerResult<()> {
        let key = context.job.key.clone();
        let task_class = context.job.task_class.clone();

        let Some(task) = self.registry.get(&task_class).await else {
            error!("任务 {} 的任务类 {} 未注册", key, task_class);
            counter!("scheduler_task_class_missing_total").increment(1);
            self.record(
                AuditLog::new(
                    &key.group,
                    &key.name,
                    context.fire_time,
                    std::time::Duration::ZERO,
                    AuditOutcome::Failure,
                )
                .with_log(Some(format!("任务类未注册: {task_class}"))),
            )
            .await;
            self.notifier
                .push(format!("任务 {key} 的任务类 {task_class} 未注册，已停止触发"));
            return Err(SchedulerError::TaskClassNotFound(task_class));
        };

        let task_context = TaskContext {
            key: key.clone(),
            parameters: context.merged_data.clone(),
            fire_time: context.fire_time,
            scheduled_fire_time: context.scheduled_fire_time,
            retry_count: retry_count(&context.merged_data),
        };

        debug!(
            "执行任务 {}，任务类 {}，重试次数 {}",
            key, task_class, task_context.retry_count
        );
        let started = Instant::now();
        let result = task.run(&task_context).await;
        let elapsed = started.elapsed();

        counter!("scheduler_task_executions_total", "task_class" => task_class.clone()).increment(1);
        histogram!("scheduler_task_execution_duration_ms", "task_class" => task_class.clone())
            .record(elapsed.as_secs_f64() * 1_000.0);

        match result {
            Ok(log) => {
                info!("任务 {} 执行成功，耗时 {:?}", key, elapsed);
                self.record(
                    AuditLog::new(
                        &key.group,
                        &key.name,
                        context.fire_time,
                        elapsed,
                        AuditOutcome::Success,
                    )
                    .with_log(log),
                )
                .await;
                self.retry_handler.reset_after_success(&key).await
            }
            Err(task_error) => {
                counter!("scheduler_task_failures_total", "task_class" => task_class).increment(1);
                warn!("任务 {} 执行失败: {}", key, task_error);
                let message = task_error.to_string();

                match self.retry_handler.handle_failure(&context, task_error).await {
                    Ok(decision) => {
                        let (outcome, detail) = match &decision {
                            RetryDecision::Scheduled {
                                attempt, fire_time, ..
                            } => (
                                AuditOutcome::Retrying,
                                format!("第 {attempt} 次重试计划于 {fire_time}"),
                            ),
                            RetryDecision::Skipped { next_fire_time } => (
                                AuditOutcome::Failure,
                                format!("跳过重试，下次计划执行时间 {next_fire_time}"),
                            ),
                        };
                        self.record(
                            AuditLog::new(&key.group, &key.name, context.fire_time, elapsed, outcome)
                                .with_log(Some(message))
                                .with_detail(Some(detail)),
                        )
                        .await;
                        Ok(())
                    }
                    Err(final_error) => {
                        self.record(
                            AuditLog::new(
                                &key.group,
                                &key.name,
                                context.fire_time,
                                elapsed,
                                AuditOutcome::Failure,
                            )
                            .with_log(Some(message)),
                        )
                        .await;
                        Err(final_error)
                    }
                }
            }
        }
    }
}
