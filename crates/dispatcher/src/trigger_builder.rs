//! 调度请求中的 [`Trigger`] 到存储触发器的转换

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use scheduler_core::{
    JobDataMap, MisfireInstruction, SchedulerError, SchedulerResult, StoreTrigger, TaskKey, Trigger,
    TriggerKey, TriggerSchedule,
};

/// 按触发方式构建存储触发器，`now` 作为立即触发与延迟触发的基准时间
pub fn build_store_trigger(
    key: TriggerKey,
    job_key: TaskKey,
    trigger: &Trigger,
    now: DateTime<Utc>,
) -> SchedulerResult<StoreTrigger> {
    let (schedule, start, misfire) = match trigger {
        Trigger::Immediate => (TriggerSchedule::Once, now, MisfireInstruction::FireNow),
        Trigger::AtDateTime(at) => (TriggerSchedule::Once, *at, MisfireInstruction::FireNow),
        Trigger::AfterDuration(delay) => {
            let delay = ChronoDuration::from_std(*delay)
                .map_err(|e| SchedulerError::InvalidTrigger(format!("延迟时间过长: {e}")))?;
            let start = now
                .checked_add_signed(delay)
                .ok_or_else(|| SchedulerError::InvalidTrigger("延迟时间过长".to_string()))?;
            (TriggerSchedule::Once, start, MisfireInstruction::FireNow)
        }
        Trigger::Interval(spec) => {
            let period_ms = spec.to_total_seconds().saturating_mul(1_000);
            (
                TriggerSchedule::Interval { period_ms },
                spec.start().unwrap_or(now),
                MisfireInstruction::RescheduleNowWithExistingCount,
            )
        }
        Trigger::Cron(spec) => (
            TriggerSchedule::Cron {
                expression: spec.expression().to_string(),
            },
            spec.start().unwrap_or(now),
            MisfireInstruction::FireOnceNowAndProceed,
        ),
    };

    Ok(StoreTrigger::new(key, job_key, schedule, start, misfire))
}

/// 立即触发一次的临时触发器，忽略错过策略
pub fn resend_trigger(key: TriggerKey, job_key: TaskKey, now: DateTime<Utc>) -> StoreTrigger {
    StoreTrigger::new(
        key,
        job_key,
        TriggerSchedule::Once,
        now,
        MisfireInstruction::IgnoreMisfires,
    )
}

/// 在指定时间触发一次的重试触发器，携带包含新重试计数的参数副本
pub fn retry_trigger(
    key: TriggerKey,
    job_key: TaskKey,
    fire_at: DateTime<Utc>,
    data: JobDataMap,
) -> StoreTrigger {
    StoreTrigger::new(
        key,
        job_key,
        TriggerSchedule::Once,
        fire_at,
        MisfireInstruction::FireNow,
    )
    .with_data(data)
}
