use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 单次执行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditOutcome {
    #[serde(rename = "SUCCESS")]
    Success,
    /// 最终失败：重试已耗尽或未配置重试
    #[serde(rename = "FAILURE")]
    Failure,
    /// 本次失败，但已安排重试
    #[serde(rename = "RETRYING")]
    Retrying,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failure => "FAILURE",
            AuditOutcome::Retrying => "RETRYING",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuditOutcome::Success)
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(AuditOutcome::Success),
            "FAILURE" => Ok(AuditOutcome::Failure),
            "RETRYING" => Ok(AuditOutcome::Retrying),
            _ => Err(format!("Invalid audit outcome: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for AuditOutcome {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for AuditOutcome {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<AuditOutcome>().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for AuditOutcome {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务执行审计记录，只追加不修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    pub group_id: String,
    pub task_id: String,
    pub fire_time: DateTime<Utc>,
    pub run_time_ms: i64,
    pub outcome: AuditOutcome,
    pub log: Option<String>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(
        group_id: impl Into<String>,
        task_id: impl Into<String>,
        fire_time: DateTime<Utc>,
        run_time: Duration,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: 0, // 将由仓储生成
            group_id: group_id.into(),
            task_id: task_id.into(),
            fire_time,
            run_time_ms: i64::try_from(run_time.as_millis()).unwrap_or(i64::MAX),
            outcome,
            log: None,
            detail: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_log(mut self, log: Option<String>) -> Self {
        self.log = log;
        self
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }
}
