//! 调度器核心库
//!
//! 提供任务调度引擎共享的基础设施：统一错误类型、配置加载、日志初始化、
//! 领域模型（触发器、任务键、重试策略、存储触发器、审计日志、调度快照）
//! 以及与外部协作者之间的抽象接口（任务存储、审计日志、通知、ID生成）。

pub mod config;
pub mod cron_utils;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use cron_utils::CronScheduler;
pub use errors::*;
pub use models::{
    AuditLog, AuditOutcome, BackoffStrategy, DataValue, GroupMatcher, JobDataMap, JobDetail,
    MisfireInstruction, RetryPolicy, StoreTrigger, TaskGroup, TaskKey, TaskRequest, TaskSchedule, Trigger,
    TriggerKey, TriggerSchedule, TriggerState,
};

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
