//! 测试数据构建器

use chrono::{DateTime, Utc};

use scheduler_core::traits::JobExecutionContext;
use scheduler_core::{
    JobDataMap, JobDetail, MisfireInstruction, StoreTrigger, TaskKey, TriggerKey, TriggerSchedule,
};

/// 存储触发器构建器，默认立即触发一次
pub struct StoreTriggerBuilder {
    name: String,
    group: String,
    job_name: Option<String>,
    schedule: TriggerSchedule,
    start: DateTime<Utc>,
    misfire: MisfireInstruction,
    data: JobDataMap,
}

impl StoreTriggerBuilder {
    pub fn new(name: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            job_name: None,
            schedule: TriggerSchedule::Once,
            start: Utc::now(),
            misfire: MisfireInstruction::FireNow,
            data: JobDataMap::new(),
        }
    }

    /// 所属任务名，缺省与触发器同名
    pub fn for_job(mut self, job_name: &str) -> Self {
        self.job_name = Some(job_name.to_string());
        self
    }

    pub fn interval_ms(mut self, period_ms: u64) -> Self {
        self.schedule = TriggerSchedule::Interval { period_ms };
        self.misfire = MisfireInstruction::RescheduleNowWithExistingCount;
        self
    }

    pub fn cron(mut self, expression: &str) -> Self {
        self.schedule = TriggerSchedule::Cron {
            expression: expression.to_string(),
        };
        self.misfire = MisfireInstruction::FireOnceNowAndProceed;
        self
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub fn with_misfire(mut self, misfire: MisfireInstruction) -> Self {
        self.misfire = misfire;
        self
    }

    pub fn with_data(mut self, data: JobDataMap) -> Self {
        self.data = data;
        self
    }

    pub fn build(self) -> StoreTrigger {
        let job_name = self.job_name.unwrap_or_else(|| self.name.clone());
        StoreTrigger::new(
            TriggerKey::new(self.name, self.group.clone()),
            TaskKey::new(job_name, self.group),
            self.schedule,
            self.start,
            self.misfire,
        )
        .with_data(self.data)
    }
}

/// 构建一次触发的执行上下文
pub fn execution_context(job: &JobDetail, trigger: &StoreTrigger) -> JobExecutionContext {
    let now = Utc::now();
    JobExecutionContext {
        fire_instance_id: format!("test-{}", now.timestamp_nanos_opt().unwrap_or(0)),
        job: job.clone(),
        trigger: trigger.clone(),
        merged_data: job.data.merged_with(&trigger.data),
        scheduled_fire_time: trigger.previous_fire_time.unwrap_or(now),
        fire_time: now,
    }
}
