//! 审计日志仓储实现

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryAuditLogRepository;
pub use sqlite::SqliteAuditLogRepository;
