//! 调度引擎的基础设施实现
//!
//! - [`store::LocalTaskStore`]：进程内任务存储，自带触发循环与工作线程池，可选SQLite持久化
//! - [`audit`]：内存与SQLite审计日志仓储
//! - [`SnowflakeIdGenerator`]：雪花ID生成器
//! - [`notifier`]：日志与广播通知通道

pub mod audit;
pub mod database;
pub mod id_generator;
pub mod notifier;
pub mod store;

pub use audit::{InMemoryAuditLogRepository, SqliteAuditLogRepository};
pub use database::DatabaseManager;
pub use id_generator::SnowflakeIdGenerator;
pub use notifier::{BroadcastNotifier, TracingNotifier};
pub use store::{JobPersistence, LocalTaskStore, PersistedState, SqliteJobPersistence};
