use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::{JobDataMap, TaskKey, TriggerKey};
use crate::cron_utils::CronScheduler;

/// 存储触发器的调度方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSchedule {
    /// 只触发一次
    Once,
    /// 按固定周期无限重复
    Interval { period_ms: u64 },
    /// 按CRON表达式触发
    Cron { expression: String },
}

/// 错过触发窗口后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MisfireInstruction {
    /// 立即触发
    FireNow,
    /// 立即触发，并以当前时间重新对齐后续周期，不补发错过的次数
    RescheduleNowWithExistingCount,
    /// 所有错过的时间点合并为一次立即触发，之后从当前时间后的下一个边界继续
    FireOnceNowAndProceed,
    /// 忽略错过，按原计划时间尽快触发
    IgnoreMisfires,
}

impl MisfireInstruction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MisfireInstruction::FireNow => "FIRE_NOW",
            MisfireInstruction::RescheduleNowWithExistingCount => "RESCHEDULE_NOW_WITH_EXISTING_COUNT",
            MisfireInstruction::FireOnceNowAndProceed => "FIRE_ONCE_NOW_AND_PROCEED",
            MisfireInstruction::IgnoreMisfires => "IGNORE_MISFIRES",
        }
    }
}

impl FromStr for MisfireInstruction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIRE_NOW" => Ok(MisfireInstruction::FireNow),
            "RESCHEDULE_NOW_WITH_EXISTING_COUNT" => {
                Ok(MisfireInstruction::RescheduleNowWithExistingCount)
            }
            "FIRE_ONCE_NOW_AND_PROCEED" => Ok(MisfireInstruction::FireOnceNowAndProceed),
            "IGNORE_MISFIRES" => Ok(MisfireInstruction::IgnoreMisfires),
            _ => Err(format!("Invalid misfire instruction: {s}")),
        }
    }
}

/// 触发器状态
///
/// 变体按限制程度从高到低排列，多个触发器的汇总状态取最小值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TriggerState {
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "COMPLETE")]
    Complete,
    #[serde(rename = "NONE")]
    None,
}

impl TriggerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Paused => "PAUSED",
            TriggerState::Error => "ERROR",
            TriggerState::Normal => "NORMAL",
            TriggerState::Complete => "COMPLETE",
            TriggerState::None => "NONE",
        }
    }

    /// 汇总多个触发器的状态，取限制最严格者；没有触发器时为 `None`
    pub fn most_restrictive<I: IntoIterator<Item = TriggerState>>(states: I) -> TriggerState {
        states.into_iter().min().unwrap_or(TriggerState::None)
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAUSED" => Ok(TriggerState::Paused),
            "ERROR" => Ok(TriggerState::Error),
            "NORMAL" => Ok(TriggerState::Normal),
            "COMPLETE" => Ok(TriggerState::Complete),
            "NONE" => Ok(TriggerState::None),
            _ => Err(format!("Invalid trigger state: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TriggerState {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TriggerState {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<TriggerState>().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TriggerState {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务存储持有的触发器
///
/// 一次性触发器触发后 `next_fire_time` 变为 `None`，在任务执行结束后由存储移除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreTrigger {
    pub key: TriggerKey,
    pub job_key: TaskKey,
    pub description: Option<String>,
    pub schedule: TriggerSchedule,
    pub start_time: DateTime<Utc>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub times_fired: u32,
    pub misfire_instruction: MisfireInstruction,
    pub state: TriggerState,
    pub data: JobDataMap,
}

impl StoreTrigger {
    pub fn new(
        key: TriggerKey,
        job_key: TaskKey,
        schedule: TriggerSchedule,
        start_time: DateTime<Utc>,
        misfire_instruction: MisfireInstruction,
    ) -> Self {
        let mut trigger = Self {
            key,
            job_key,
            description: None,
            schedule,
            start_time,
            next_fire_time: None,
            previous_fire_time: None,
            times_fired: 0,
            misfire_instruction,
            state: TriggerState::Normal,
            data: JobDataMap::new(),
        };
        trigger.next_fire_time = trigger.compute_first_fire_time();
        trigger
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data(mut self, data: JobDataMap) -> Self {
        self.data = data;
        self
    }

    /// 首次触发时间
    pub fn compute_first_fire_time(&self) -> Option<DateTime<Utc>> {
        match &self.schedule {
            TriggerSchedule::Once | TriggerSchedule::Interval { .. } => Some(self.start_time),
            TriggerSchedule::Cron { .. } => {
                let before = self
                    .start_time
                    .checked_sub_signed(Duration::nanoseconds(1))
                    .unwrap_or(self.start_time);
                self.fire_time_after(before)
            }
        }
    }

    /// 严格晚于 `after` 的下一次触发时间，超出可表示的时间范围时为 `None`
    pub fn fire_time_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.schedule {
            TriggerSchedule::Once => None,
            TriggerSchedule::Interval { period_ms } => {
                let period = i64::try_from(*period_ms).ok().filter(|p| *p > 0)?;
                if after < self.start_time {
                    return Some(self.start_time);
                }
                let elapsed = (after - self.start_time).num_milliseconds();
                let periods = elapsed / period + 1;
                let offset = Duration::try_milliseconds(periods.checked_mul(period)?)?;
                self.start_time.checked_add_signed(offset)
            }
            TriggerSchedule::Cron { expression } => match CronScheduler::new(expression) {
                Ok(cron) => cron.next_execution_time(after),
                Err(e) => {
                    warn!("触发器 {} 的CRON表达式无法解析: {}", self.key, e);
                    None
                }
            },
        }
    }

    /// 是否错过了触发窗口
    pub fn is_misfired(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if self.misfire_instruction == MisfireInstruction::IgnoreMisfires {
            return false;
        }
        match self.next_fire_time {
            Some(next) => next
                .checked_add_signed(threshold)
                .is_some_and(|deadline| deadline < now),
            None => false,
        }
    }

    /// 按错过处理策略更新下次触发时间
    pub fn update_after_misfire(&mut self, now: DateTime<Utc>) {
        match self.misfire_instruction {
            MisfireInstruction::IgnoreMisfires => {}
            MisfireInstruction::FireNow | MisfireInstruction::FireOnceNowAndProceed => {
                self.next_fire_time = Some(now);
            }
            MisfireInstruction::RescheduleNowWithExistingCount => {
                self.start_time = now;
                self.next_fire_time = Some(now);
            }
        }
    }

    /// 记录一次触发，并推进到下一次触发时间
    pub fn triggered(&mut self) {
        self.times_fired = self.times_fired.saturating_add(1);
        self.previous_fire_time = self.next_fire_time;
        self.next_fire_time = self
            .previous_fire_time
            .and_then(|fired| self.fire_time_after(fired));
    }

    pub fn may_fire_again(&self) -> bool {
        self.next_fire_time.is_some()
    }
}
