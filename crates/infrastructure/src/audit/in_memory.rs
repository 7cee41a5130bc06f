use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use scheduler_core::traits::AuditLogRepository;
use scheduler_core::{AuditLog, SchedulerResult};

/// 内存审计日志仓储，进程退出后记录丢失
#[derive(Debug, Default)]
pub struct InMemoryAuditLogRepository {
    entries: RwLock<Vec<AuditLog>>,
    next_id: AtomicI64,
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn belongs_to(entry: &AuditLog, group_id: &str, task_id: &str) -> bool {
    entry.group_id == group_id && entry.task_id == task_id
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, entry: &AuditLog) -> SchedulerResult<AuditLog> {
        let mut stored = entry.clone();
        stored.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.entries.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn most_recent(&self, group_id: &str, task_id: &str) -> SchedulerResult<Option<AuditLog>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .find(|e| belongs_to(e, group_id, task_id))
            .cloned())
    }

    async fn count(&self, group_id: &str, task_id: &str) -> SchedulerResult<u64> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| belongs_to(e, group_id, task_id)).count() as u64)
    }

    async fn failures(&self, group_id: &str, task_id: &str) -> SchedulerResult<u64> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| belongs_to(e, group_id, task_id) && !e.outcome.is_success())
            .count() as u64)
    }

    async fn find_by_task(
        &self,
        group_id: &str,
        task_id: &str,
        limit: usize,
    ) -> SchedulerResult<Vec<AuditLog>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| belongs_to(e, group_id, task_id))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scheduler_core::AuditOutcome;
    use std::time::Duration;

    fn entry(task: &str, outcome: AuditOutcome, log: &str) -> AuditLog {
        AuditLog::new("g1", task, Utc::now(), Duration::from_millis(5), outcome)
            .with_log(Some(log.to_string()))
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let repo = InMemoryAuditLogRepository::new();
        let a = repo.append(&entry("t1", AuditOutcome::Success, "a")).await.unwrap();
        let b = repo.append(&entry("t1", AuditOutcome::Success, "b")).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn test_counts_and_most_recent() {
        let repo = InMemoryAuditLogRepository::new();
        repo.append(&entry("t1", AuditOutcome::Success, "first")).await.unwrap();
        repo.append(&entry("t1", AuditOutcome::Retrying, "second")).await.unwrap();
        repo.append(&entry("t1", AuditOutcome::Failure, "third")).await.unwrap();
        repo.append(&entry("t2", AuditOutcome::Failure, "other")).await.unwrap();

        assert_eq!(repo.count("g1", "t1").await.unwrap(), 3);
        assert_eq!(repo.failures("g1", "t1").await.unwrap(), 2);

        let recent = repo.most_recent("g1", "t1").await.unwrap().unwrap();
        assert_eq!(recent.log.as_deref(), Some("third"));

        let last_two = repo.find_by_task("g1", "t1", 2).await.unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].log.as_deref(), Some("third"));
        assert_eq!(last_two[1].log.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_unknown_task_is_empty() {
        let repo = InMemoryAuditLogRepository::new();
        assert!(repo.is_empty().await);
        assert_eq!(repo.count("g", "missing").await.unwrap(), 0);
        assert!(repo.most_recent("g", "missing").await.unwrap().is_none());
    }
}
