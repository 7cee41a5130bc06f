use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::cron_utils::CronScheduler;
use crate::{SchedulerError, SchedulerResult};

/// 调度请求中的触发器
///
/// 每个调度请求只有一种触发方式。触发器在构建存储触发器时被消费一次，
/// 之后不再修改；重新触发会创建新的值。
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// 调度后立即执行一次
    Immediate,
    /// 在指定时刻执行一次
    AtDateTime(DateTime<Utc>),
    /// 在当前时间加上给定时长后执行一次
    AfterDuration(Duration),
    /// 从起始时间（缺省为立即）开始按固定间隔无限重复
    Interval(IntervalSpec),
    /// 按CRON表达式执行
    Cron(CronSpec),
}

impl Trigger {
    /// 构建间隔触发器，总间隔必须大于0
    pub fn interval(
        start: Option<DateTime<Utc>>,
        days: u32,
        hours: u32,
        minutes: u32,
        seconds: u32,
    ) -> SchedulerResult<Self> {
        IntervalSpec::new(start, days, hours, minutes, seconds).map(Trigger::Interval)
    }

    /// 构建CRON触发器，空白或无法解析的表达式在构造时即被拒绝
    pub fn cron(start: Option<DateTime<Utc>>, expression: impl Into<String>) -> SchedulerResult<Self> {
        CronSpec::new(start, expression).map(Trigger::Cron)
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Trigger::Interval(_) | Trigger::Cron(_))
    }
}

/// 间隔触发器允许的最长周期（约100年）
pub const MAX_INTERVAL_SECONDS: u64 = 36_500 * 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSpec {
    start: Option<DateTime<Utc>>,
    days: u32,
    hours: u32,
    minutes: u32,
    seconds: u32,
}

impl IntervalSpec {
    pub fn new(
        start: Option<DateTime<Utc>>,
        days: u32,
        hours: u32,
        minutes: u32,
        seconds: u32,
    ) -> SchedulerResult<Self> {
        let spec = Self {
            start,
            days,
            hours,
            minutes,
            seconds,
        };
        if spec.to_total_seconds() == 0 {
            return Err(SchedulerError::InvalidTrigger(
                "间隔触发器的总时长必须大于0".to_string(),
            ));
        }
        if spec.to_total_seconds() > MAX_INTERVAL_SECONDS {
            return Err(SchedulerError::InvalidTrigger(format!(
                "间隔触发器的总时长不能超过 {} 秒",
                MAX_INTERVAL_SECONDS
            )));
        }
        Ok(spec)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn hours(&self) -> u32 {
        self.hours
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn to_total_seconds(&self) -> u64 {
        u64::from(self.days) * 86_400
            + u64::from(self.hours) * 3_600
            + u64::from(self.minutes) * 60
            + u64::from(self.seconds)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.to_total_seconds())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSpec {
    start: Option<DateTime<Utc>>,
    expression: String,
}

impl CronSpec {
    pub fn new(start: Option<DateTime<Utc>>, expression: impl Into<String>) -> SchedulerResult<Self> {
        let expression = expression.into();
        if expression.trim().is_empty() {
            return Err(SchedulerError::InvalidCron {
                expr: expression,
                message: "表达式不能为空".to_string(),
            });
        }
        CronScheduler::validate_cron_expression(&expression)?;

        Ok(Self {
            start,
            expression: expression.trim().to_string(),
        })
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}
