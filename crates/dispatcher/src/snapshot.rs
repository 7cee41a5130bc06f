//! 调度快照组装
//!
//! 快照由任务存储与审计日志实时拼装，审计日志不可用时以空值代替，不会让整个列表失败。

use std::time::Duration;
use tracing::warn;

use scheduler_core::traits::{AuditLogRepository, IdGenerator};
use scheduler_core::{
    CronScheduler, JobDetail, StoreTrigger, TaskSchedule, TriggerSchedule, TriggerState,
};

/// 把时长格式化为中文描述，如 `1小时30分钟`
pub fn describe_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    if total_secs == 0 {
        return format!("{}毫秒", duration.subsec_millis());
    }

    let units = [
        (total_secs / 86_400, "天"),
        (total_secs % 86_400 / 3_600, "小时"),
        (total_secs % 3_600 / 60, "分钟"),
        (total_secs % 60, "秒"),
    ];
    units
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect()
}

/// 从任务ID中取出雪花ID部分，任务ID形如 `{snowflake}-{nanos}`
pub fn snowflake_part(task_id: &str) -> &str {
    task_id.split('-').next().unwrap_or(task_id)
}

pub struct SnapshotAssembler<'a> {
    audit_log: &'a dyn AuditLogRepository,
    id_generator: &'a dyn IdGenerator,
}

impl<'a> SnapshotAssembler<'a> {
    pub fn new(audit_log: &'a dyn AuditLogRepository, id_generator: &'a dyn IdGenerator) -> Self {
        Self {
            audit_log,
            id_generator,
        }
    }

    pub async fn assemble(&self, job: &JobDetail, triggers: &[StoreTrigger]) -> TaskSchedule {
        let group_id = &job.key.group;
        let task_id = &job.key.name;

        let state = TriggerState::most_restrictive(triggers.iter().map(|t| t.state));
        let next_fire_time = triggers.iter().filter_map(|t| t.next_fire_time).min();
        let (schedule_description, cron_expression) = describe_schedule(job, triggers);

        let recent = match self.audit_log.most_recent(group_id, task_id).await {
            Ok(recent) => recent,
            Err(e) => {
                warn!("查询任务 {} 的最近执行记录失败: {}", job.key, e);
                None
            }
        };
        let run_count = self.audit_log.count(group_id, task_id).await.unwrap_or_else(|e| {
            warn!("统计任务 {} 的执行次数失败: {}", job.key, e);
            0
        });
        let failure_count = self
            .audit_log
            .failures(group_id, task_id)
            .await
            .unwrap_or_else(|e| {
                warn!("统计任务 {} 的失败次数失败: {}", job.key, e);
                0
            });

        let parsed_id = self
            .id_generator
            .parse(snowflake_part(task_id))
            .ok()
            .map(|parsed| parsed.to_string());

        TaskSchedule {
            group_id: group_id.clone(),
            task_id: task_id.clone(),
            description: job.description.clone(),
            parsed_id,
            task_class: job.task_class.clone(),
            next_fire_time,
            state,
            last_outcome: recent.as_ref().map(|r| r.outcome),
            last_log: recent.as_ref().and_then(|r| r.log.clone()),
            last_detail: recent.and_then(|r| r.detail),
            schedule_description,
            cron_expression,
            run_count,
            failure_count,
            parameters: job.data.to_display_map(),
        }
    }
}

/// 调度描述取自任务的周期性触发器，优先使用与任务同名的原始触发器
fn describe_schedule(job: &JobDetail, triggers: &[StoreTrigger]) -> (Option<String>, Option<String>) {
    let recurring = |t: &&StoreTrigger| !matches!(t.schedule, TriggerSchedule::Once);
    let primary = triggers
        .iter()
        .filter(recurring)
        .find(|t| t.key.name == job.key.name)
        .or_else(|| triggers.iter().find(recurring));

    match primary.map(|t| &t.schedule) {
        Some(TriggerSchedule::Interval { period_ms }) => (
            Some(format!("每{}", describe_duration(Duration::from_millis(*period_ms)))),
            None,
        ),
        Some(TriggerSchedule::Cron { expression }) => {
            let description = CronScheduler::new(expression).ok().map(|cron| cron.describe());
            (description, Some(expression.clone()))
        }
        Some(TriggerSchedule::Once) | None => (None, None),
    }
}
