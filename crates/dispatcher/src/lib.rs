//! 调度核心
//!
//! [`TaskScheduler`] 是面向调用方的门面：按分组调度、暂停、恢复、删除、重发任务，
//! 并结合审计日志生成报表快照。任务体由存储的工作池通过
//! [`TaskExecutionHandler`] 执行，失败时交给 [`RetryHandler`] 决定是否重试。

pub mod execution;
pub mod registry;
pub mod retry_service;
pub mod scheduler;
pub mod snapshot;
pub mod trigger_builder;

pub use execution::TaskExecutionHandler;
pub use registry::TaskRegistry;
pub use retry_service::{RetryDecision, RetryHandler};
pub use scheduler::TaskScheduler;
pub use snapshot::{describe_duration, SnapshotAssembler};
