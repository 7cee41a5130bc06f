//! # 数据模型
//!
//! 定义任务调度引擎的核心数据结构。
//!
//! ## 核心模型
//!
//! ### Trigger - 调度请求中的触发器
//! 描述任务何时执行：立即、指定时刻、延迟后、固定间隔或CRON表达式。
//! 只在构建存储触发器时被消费一次，之后不再修改。
//!
//! ### TaskKey / TriggerKey - 存储中的身份
//! `(name, group)` 二元组，`group` 作为业务分组（通常是所属实体的ID）。
//!
//! ### RetryPolicy - 重试策略
//! 最大重试次数加退避策略，扁平化后写入任务参数表，随任务一同持久化。
//!
//! ### StoreTrigger - 存储触发器
//! 任务存储实际持有并据此触发的记录，包含下次触发时间、触发次数与状态。
//!
//! ### AuditLog / TaskSchedule - 审计与报表
//! 每次执行的审计记录，以及按需重新计算、从不持久化的调度快照。

pub mod audit_log;
pub mod job;
pub mod retry_policy;
pub mod store_trigger;
pub mod task;
pub mod task_key;
pub mod task_schedule;
pub mod trigger;

pub use audit_log::{AuditLog, AuditOutcome};
pub use job::{DataValue, JobDataMap, JobDetail};
pub use retry_policy::{BackoffStrategy, RetryPolicy, COUNT_KEY};
pub use store_trigger::{MisfireInstruction, StoreTrigger, TriggerSchedule, TriggerState};
pub use task::TaskRequest;
pub use task_key::{GroupMatcher, TaskKey, TriggerKey};
pub use task_schedule::{TaskGroup, TaskSchedule};
pub use trigger::{CronSpec, IntervalSpec, Trigger};
