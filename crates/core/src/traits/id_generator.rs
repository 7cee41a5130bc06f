use chrono::{DateTime, Utc};
use std::fmt;

use crate::SchedulerResult;

/// 解析后的ID组成部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedId {
    pub machine_id: u16,
    pub sequence: u16,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for ParsedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "machine={} seq={} time={}",
            self.machine_id,
            self.sequence,
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC")
        )
    }
}

/// ID生成器
///
/// 生成全局有序、可解析、URL安全的唯一ID，并发调用下同样唯一。
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;

    fn parse(&self, id: &str) -> SchedulerResult<ParsedId>;
}
