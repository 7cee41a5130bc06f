use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{AuditOutcome, TriggerState};

/// 调度快照
///
/// 汇总任务存储与审计日志的只读视图，每次查询重新计算，从不持久化。
/// 缺失的审计记录或调度描述以 `None` 表示，而不是让整个列表失败。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub group_id: String,
    pub task_id: String,
    pub description: Option<String>,
    /// 任务ID中雪花ID部分的解析结果
    pub parsed_id: Option<String>,
    pub task_class: String,
    /// `None` 表示不会再触发
    pub next_fire_time: Option<DateTime<Utc>>,
    pub state: TriggerState,
    pub last_outcome: Option<AuditOutcome>,
    pub last_log: Option<String>,
    pub last_detail: Option<String>,
    pub schedule_description: Option<String>,
    pub cron_expression: Option<String>,
    pub run_count: u64,
    pub failure_count: u64,
    pub parameters: BTreeMap<String, String>,
}

impl TaskSchedule {
    /// 按下次触发时间升序比较，没有下次触发时间的排在最后
    pub fn cmp_by_next_fire_time(&self, other: &TaskSchedule) -> Ordering {
        match (self.next_fire_time, other.next_fire_time) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// 分组及其代表性描述
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskGroup {
    pub group_id: String,
    pub description: Option<String>,
}
