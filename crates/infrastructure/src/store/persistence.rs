use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use scheduler_core::{
    JobDetail, SchedulerError, SchedulerResult, StoreTrigger, TaskKey, TriggerKey,
};

/// 持久化后重新加载的存储状态
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    pub jobs: Vec<JobDetail>,
    pub triggers: Vec<StoreTrigger>,
    pub paused_groups: Vec<String>,
}

/// 任务存储的持久化后端
#[async_trait]
pub trait JobPersistence: Send + Sync {
    /// 新增或覆盖任务定义
    async fn save_job(&self, job: &JobDetail) -> SchedulerResult<()>;

    /// 删除任务及其全部触发器
    async fn delete_job(&self, key: &TaskKey) -> SchedulerResult<()>;

    async fn save_trigger(&self, trigger: &StoreTrigger) -> SchedulerResult<()>;

    async fn delete_trigger(&self, key: &TriggerKey) -> SchedulerResult<()>;

    async fn save_paused_group(&self, group: &str) -> SchedulerResult<()>;

    async fn delete_paused_group(&self, group: &str) -> SchedulerResult<()>;

    async fn load(&self) -> SchedulerResult<PersistedState>;
}

/// 基于SQLite的持久化，任务与触发器以JSON文本保存
///
/// 表结构由 [`crate::DatabaseManager::migrate`] 创建。
pub struct SqliteJobPersistence {
    pool: SqlitePool,
}

impl SqliteJobPersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobPersistence for SqliteJobPersistence {
    #[instrument(skip(self, job), fields(job = %job.key))]
    async fn save_job(&self, job: &JobDetail) -> SchedulerResult<()> {
        let detail = serde_json::to_string(job)?;
        sqlx::query(
            "INSERT OR REPLACE INTO scheduler_jobs (job_group, job_name, detail) VALUES ($1, $2, $3)",
        )
        .bind(&job.key.group)
        .bind(&job.key.name)
        .bind(detail)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }

    #[instrument(skip(self), fields(job = %key))]
    async fn delete_job(&self, key: &TaskKey) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM scheduler_triggers WHERE job_group = $1 AND job_name = $2")
            .bind(&key.group)
            .bind(&key.name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM scheduler_jobs WHERE job_group = $1 AND job_name = $2")
            .bind(&key.group)
            .bind(&key.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, trigger), fields(trigger = %trigger.key, state = %trigger.state))]
    async fn save_trigger(&self, trigger: &StoreTrigger) -> SchedulerResult<()> {
        let body = serde_json::to_string(trigger)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO scheduler_triggers
                (trigger_group, trigger_name, job_group, job_name, state, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&trigger.key.group)
        .bind(&trigger.key.name)
        .bind(&trigger.job_key.group)
        .bind(&trigger.job_key.name)
        .bind(trigger.state)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn delete_trigger(&self, key: &TriggerKey) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM scheduler_triggers WHERE trigger_group = $1 AND trigger_name = $2")
            .bind(&key.group)
            .bind(&key.name)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn save_paused_group(&self, group: &str) -> SchedulerResult<()> {
        sqlx::query("INSERT OR IGNORE INTO scheduler_paused_groups (job_group) VALUES ($1)")
            .bind(group)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn delete_paused_group(&self, group: &str) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM scheduler_paused_groups WHERE job_group = $1")
            .bind(group)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn load(&self) -> SchedulerResult<PersistedState> {
        let jobs = sqlx::query("SELECT detail FROM scheduler_jobs")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> SchedulerResult<JobDetail> {
                let detail: String = row.try_get("detail")?;
                Ok(serde_json::from_str::<JobDetail>(&detail)?)
            })
            .collect::<SchedulerResult<Vec<_>>>()?;

        let triggers = sqlx::query("SELECT body FROM scheduler_triggers")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> SchedulerResult<StoreTrigger> {
                let body: String = row.try_get("body")?;
                Ok(serde_json::from_str::<StoreTrigger>(&body)?)
            })
            .collect::<SchedulerResult<Vec<_>>>()?;

        let paused_groups: Vec<String> =
            sqlx::query_scalar("SELECT job_group FROM scheduler_paused_groups")
                .fetch_all(&self.pool)
                .await?;

        debug!(
            "加载持久化状态: {} 个任务, {} 个触发器, {} 个暂停分组",
            jobs.len(),
            triggers.len(),
            paused_groups.len()
        );

        Ok(PersistedState {
            jobs,
            triggers,
            paused_groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseManager;
    use chrono::Utc;
    use scheduler_core::{JobDataMap, MisfireInstruction, TriggerSchedule, TriggerState};

    fn job(name: &str) -> JobDetail {
        let mut data = JobDataMap::new();
        data.put("retry.maxRetries", 3i64);
        JobDetail::new(TaskKey::new(name, "g1"), "log").with_data(data)
    }

    fn trigger(name: &str, job: &str) -> StoreTrigger {
        StoreTrigger::new(
            TriggerKey::new(name, "g1"),
            TaskKey::new(job, "g1"),
            TriggerSchedule::Interval { period_ms: 1_000 },
            Utc::now(),
            MisfireInstruction::RescheduleNowWithExistingCount,
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let manager = DatabaseManager::new("sqlite::memory:", 1).await.unwrap();
        let persistence = manager.job_persistence();

        persistence.save_job(&job("a")).await.unwrap();
        let mut t = trigger("a", "a");
        persistence.save_trigger(&t).await.unwrap();

        // 覆盖写入
        t.state = TriggerState::Paused;
        persistence.save_trigger(&t).await.unwrap();
        persistence.save_paused_group("g1").await.unwrap();
        persistence.save_paused_group("g1").await.unwrap();

        let state = persistence.load().await.unwrap();
        assert_eq!(state.jobs, vec![job("a")]);
        assert_eq!(state.triggers.len(), 1);
        assert_eq!(state.triggers[0].state, TriggerState::Paused);
        assert_eq!(state.paused_groups, vec!["g1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_job_removes_triggers() {
        let manager = DatabaseManager::new("sqlite::memory:", 1).await.unwrap();
        let persistence = manager.job_persistence();

        persistence.save_job(&job("a")).await.unwrap();
        persistence.save_job(&job("b")).await.unwrap();
        persistence.save_trigger(&trigger("a", "a")).await.unwrap();
        persistence.save_trigger(&trigger("a-retry-1", "a")).await.unwrap();
        persistence.save_trigger(&trigger("b", "b")).await.unwrap();

        persistence.delete_job(&TaskKey::new("a", "g1")).await.unwrap();
        persistence.delete_trigger(&TriggerKey::new("b", "g1")).await.unwrap();
        persistence.delete_paused_group("missing").await.unwrap();

        let state = persistence.load().await.unwrap();
        assert_eq!(state.jobs.len(), 1);
        assert_eq!(state.jobs[0].key.name, "b");
        assert!(state.triggers.is_empty());
    }
}
