#![allow(dead_code)]

use std::sync::Arc;

use scheduler_core::traits::{AuditLogRepository, ScheduledTask};
use scheduler_dispatcher::{RetryHandler, TaskExecutionHandler, TaskRegistry, TaskScheduler};
use scheduler_infrastructure::{InMemoryAuditLogRepository, LocalTaskStore, SnowflakeIdGenerator};
use scheduler_testing_utils::{RecordingNotifier, TestEnv};

/// 装配好的进程内调度引擎
pub struct Harness {
    pub store: LocalTaskStore,
    pub scheduler: TaskScheduler,
    pub registry: Arc<TaskRegistry>,
    pub audit_log: Arc<InMemoryAuditLogRepository>,
    pub notifier: RecordingNotifier,
}

impl Harness {
    pub async fn start() -> Self {
        let store = LocalTaskStore::new(TestEnv::store_config());
        let audit_log = Arc::new(InMemoryAuditLogRepository::new());
        let notifier = RecordingNotifier::new();
        let registry = Arc::new(TaskRegistry::new());
        let id_generator = Arc::new(SnowflakeIdGenerator::new(1).unwrap());

        let retry_handler = RetryHandler::new(Arc::new(store.clone()), Arc::new(notifier.clone()));
        let handler = TaskExecutionHandler::new(
            Arc::clone(&registry),
            audit_log.clone(),
            retry_handler,
            Arc::new(notifier.clone()),
        );
        store.start(Arc::new(handler)).await.unwrap();

        let scheduler = TaskScheduler::new(Arc::new(store.clone()), audit_log.clone(), id_generator);

        Self {
            store,
            scheduler,
            registry,
            audit_log,
            notifier,
        }
    }

    pub async fn register(&self, task_class: &str, task: impl ScheduledTask + 'static) {
        self.registry.register(task_class, Arc::new(task)).await;
    }

    pub async fn audit_count(&self, group: &str, task: &str) -> u64 {
        self.audit_log.count(group, task).await.unwrap()
    }

    pub async fn stop(self) {
        self.store.shutdown().await;
    }
}
