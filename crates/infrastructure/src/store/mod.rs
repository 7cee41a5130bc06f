//! 进程内任务存储
//!
//! [`LocalTaskStore`] 在内存中保存任务与触发器，自带触发循环与有界工作池；
//! 配置 [`JobPersistence`] 后所有变更同步写入SQLite，重启时通过
//! [`LocalTaskStore::recover`] 恢复，错过的触发窗口按各触发器的策略补偿。

mod local_store;
mod persistence;

pub use local_store::LocalTaskStore;
pub use persistence::{JobPersistence, PersistedState, SqliteJobPersistence};
