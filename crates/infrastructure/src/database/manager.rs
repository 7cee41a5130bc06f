use scheduler_core::{SchedulerError, SchedulerResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::audit::SqliteAuditLogRepository;
use crate::store::SqliteJobPersistence;

/// SQLite连接管理器
///
/// 审计日志与任务存储持久化共用同一个连接池，表结构在 [`DatabaseManager::migrate`] 中创建。
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(url: &str, max_connections: u32) -> SchedulerResult<Self> {
        debug!("连接SQLite数据库: {}", url);

        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // 每个内存数据库连接都是独立的库，只能使用单连接
        let max_connections = if in_memory { 1 } else { max_connections.max(1) };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(SchedulerError::Database)?;

        let manager = Self { pool };
        manager.migrate().await?;
        info!("SQLite数据库就绪: {}", url);
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 创建表结构，可重复执行
    pub async fn migrate(&self) -> SchedulerResult<()> {
        debug!("执行SQLite数据库迁移");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                fire_time DATETIME NOT NULL,
                run_time_ms INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                log TEXT,
                detail TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_jobs (
                job_group TEXT NOT NULL,
                job_name TEXT NOT NULL,
                detail TEXT NOT NULL,
                PRIMARY KEY (job_group, job_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_triggers (
                trigger_group TEXT NOT NULL,
                trigger_name TEXT NOT NULL,
                job_group TEXT NOT NULL,
                job_name TEXT NOT NULL,
                state TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (trigger_group, trigger_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_paused_groups (
                job_group TEXT PRIMARY KEY
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_task ON audit_logs(group_id, task_id)",
            "CREATE INDEX IF NOT EXISTS idx_scheduler_triggers_job ON scheduler_triggers(job_group, job_name)",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql).execute(&self.pool).await?;
        }

        debug!("SQLite数据库迁移完成");
        Ok(())
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn audit_log_repository(&self) -> SqliteAuditLogRepository {
        SqliteAuditLogRepository::new(self.pool.clone())
    }

    pub fn job_persistence(&self) -> SqliteJobPersistence {
        SqliteJobPersistence::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
