use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use tracing::{debug, info, warn};

use scheduler_core::models::retry_policy::retry_count;
use scheduler_core::models::COUNT_KEY;
use scheduler_core::traits::{JobExecutionContext, Notifier, TaskStore};
use scheduler_core::{JobDataMap, RetryPolicy, SchedulerError, SchedulerResult, TaskKey, TriggerKey};

use crate::snapshot::describe_duration;
use crate::trigger_builder::retry_trigger;

/// 失败后的重试决策
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// 已创建重试触发器
    Scheduled {
        attempt: u32,
        delay: Duration,
        fire_time: DateTime<Utc>,
    },
    /// 任务自身的下次触发早于重试时间，不再单独重试
    Skipped { next_fire_time: DateTime<Utc> },
}

/// 重试处理器
///
/// 在失败任务的执行上下文中同步运行。重试计数保存在任务参数中，随重试触发器的参数副本传递，
/// 不在内存中共享。
pub struct RetryHandler {
    store: Arc<dyn TaskStore>,
    notifier: Arc<dyn Notifier>,
}

impl RetryHandler {
    pub fn new(store: Arc<dyn TaskStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// 处理一次失败
    ///
    /// 返回 `Err` 表示不再重试，错误应继续向上抛出，由存储记录为任务失败。
    pub async fn handle_failure(
        &self,
        context: &JobExecutionContext,
        error: SchedulerError,
    ) -> SchedulerResult<RetryDecision> {
        let key = &context.job.key;

        let policy = match RetryPolicy::decode(&context.merged_data) {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                debug!("任务 {} 未配置重试策略", key);
                return Err(error);
            }
            Err(e) => {
                warn!("任务 {} 的重试策略无法解析: {}", key, e);
                return Err(error);
            }
        };

        let count = retry_count(&context.merged_data);
        if count >= policy.max_retries() {
            self.reset_counter(key).await?;
            counter!("scheduler_retries_exhausted_total").increment(1);
            self.notifier.push(format!(
                "任务 {} 已重试 {} 次仍然失败: {}",
                key,
                policy.max_retries(),
                error
            ));
            return Err(error);
        }

        let attempt = count + 1;
        let delay = policy.backoff().delay_for(attempt);
        let mut data = self.current_job_data(context).await?;
        data.put(COUNT_KEY, i64::from(attempt));
        self.store.update_job_data(key, data.clone()).await?;

        let now = Utc::now();
        let fire_time = ChronoDuration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or_else(|| now + ChronoDuration::days(365));

        let next_natural = self
            .store
            .get_triggers_of_job(key)
            .await?
            .iter()
            .filter_map(|t| t.next_fire_time)
            .min();

        if let Some(next_fire_time) = next_natural.filter(|next| *next <= fire_time) {
            self.reset_counter(key).await?;
            counter!("scheduler_retries_skipped_total").increment(1);
            self.notifier.push(format!(
                "任务 {} 执行失败，下次计划执行时间 {} 早于重试时间，跳过重试: {}",
                key, next_fire_time, error
            ));
            return Ok(RetryDecision::Skipped { next_fire_time });
        }

        let trigger_key = TriggerKey::new(format!("{}-retry-{}", key.name, attempt), key.group.clone());
        let trigger = retry_trigger(trigger_key.clone(), key.clone(), fire_time, data);
        self.store.schedule_trigger(trigger).await?;

        counter!("scheduler_retries_scheduled_total").increment(1);
        info!(
            "任务 {} 第 {} 次重试将在 {} 后执行，触发器 {}",
            key,
            attempt,
            describe_duration(delay),
            trigger_key
        );
        self.notifier.push(format!(
            "任务 {} 执行失败，将在 {} 后进行第 {} 次重试: {}",
            key,
            describe_duration(delay),
            attempt,
            error
        ));

        Ok(RetryDecision::Scheduled {
            attempt,
            delay,
            fire_time,
        })
    }

    /// 执行成功后清零重试计数
    pub async fn reset_after_success(&self, key: &TaskKey) -> SchedulerResult<()> {
        let Some(job) = self.store.get_job_detail(key).await? else {
            return Ok(());
        };
        if retry_count(&job.data) != 0 {
            debug!("任务 {} 执行成功，重试计数清零", key);
            self.write_counter(key, job.data, 0).await?;
        }
        Ok(())
    }

    async fn reset_counter(&self, key: &TaskKey) -> SchedulerResult<()> {
        if let Some(job) = self.store.get_job_detail(key).await? {
            self.write_counter(key, job.data, 0).await?;
        }
        Ok(())
    }

    async fn write_counter(&self, key: &TaskKey, mut data: JobDataMap, count: u32) -> SchedulerResult<()> {
        data.put(COUNT_KEY, i64::from(count));
        self.store.update_job_data(key, data).await?;
        Ok(())
    }

    /// 存储中最新的任务参数；任务已被并发删除时退回触发时的副本
    async fn current_job_data(&self, context: &JobExecutionContext) -> SchedulerResult<JobDataMap> {
        Ok(self
            .store
            .get_job_detail(&context.job.key)
            .await?
            .map_or_else(|| context.job.data.clone(), |job| job.data))
    }
}
