use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use scheduler_core::traits::AuditLogRepository;
use scheduler_core::{AuditLog, SchedulerError, SchedulerResult};

const SELECT_COLUMNS: &str =
    "SELECT id, group_id, task_id, fire_time, run_time_ms, outcome, log, detail, created_at FROM audit_logs";

/// SQLite审计日志仓储
///
/// 表结构由 [`crate::DatabaseManager::migrate`] 创建。
pub struct SqliteAuditLogRepository {
    pool: SqlitePool,
}

impl SqliteAuditLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_audit_log(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<AuditLog> {
        Ok(AuditLog {
            id: row.try_get("id")?,
            group_id: row.try_get("group_id")?,
            task_id: row.try_get("task_id")?,
            fire_time: row.try_get("fire_time")?,
            run_time_ms: row.try_get("run_time_ms")?,
            outcome: row.try_get("outcome")?,
            log: row.try_get("log")?,
            detail: row.try_get("detail")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn count_where(&self, sql: &str, group_id: &str, task_id: &str) -> SchedulerResult<u64> {
        let count: i64 = sqlx::query_scalar(sql)
            .bind(group_id)
            .bind(task_id)
            .fetch_one(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl AuditLogRepository for SqliteAuditLogRepository {
    #[instrument(skip(self, entry), fields(
        group_id = %entry.group_id,
        task_id = %entry.task_id,
        outcome = %entry.outcome,
    ))]
    async fn append(&self, entry: &AuditLog) -> SchedulerResult<AuditLog> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (group_id, task_id, fire_time, run_time_ms, outcome, log, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.group_id)
        .bind(&entry.task_id)
        .bind(entry.fire_time)
        .bind(entry.run_time_ms)
        .bind(entry.outcome)
        .bind(&entry.log)
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let mut stored = entry.clone();
        stored.id = result.last_insert_rowid();
        debug!("写入审计日志成功: ID {}", stored.id);
        Ok(stored)
    }

    async fn most_recent(&self, group_id: &str, task_id: &str) -> SchedulerResult<Option<AuditLog>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE group_id = $1 AND task_id = $2 ORDER BY id DESC LIMIT 1"
        ))
        .bind(group_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_audit_log(&row)?)),
            None => Ok(None),
        }
    }

    async fn count(&self, group_id: &str, task_id: &str) -> SchedulerResult<u64> {
        self.count_where(
            "SELECT COUNT(*) FROM audit_logs WHERE group_id = $1 AND task_id = $2",
            group_id,
            task_id,
        )
        .await
    }

    async fn failures(&self, group_id: &str, task_id: &str) -> SchedulerResult<u64> {
        self.count_where(
            "SELECT COUNT(*) FROM audit_logs WHERE group_id = $1 AND task_id = $2 AND outcome <> 'SUCCESS'",
            group_id,
            task_id,
        )
        .await
    }

    async fn find_by_task(
        &self,
        group_id: &str,
        task_id: &str,
        limit: usize,
    ) -> SchedulerResult<Vec<AuditLog>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE group_id = $1 AND task_id = $2 ORDER BY id DESC LIMIT $3"
        ))
        .bind(group_id)
        .bind(task_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_audit_log).collect()
    }
}
