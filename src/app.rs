use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use scheduler_core::config::AuditBackend;
use scheduler_core::traits::{AuditLogRepository, Notifier};
use scheduler_core::AppConfig;
use scheduler_dispatcher::{RetryHandler, TaskExecutionHandler, TaskRegistry, TaskScheduler};
use scheduler_infrastructure::{
    BroadcastNotifier, DatabaseManager, InMemoryAuditLogRepository, LocalTaskStore,
    SnowflakeIdGenerator, TracingNotifier,
};

use crate::tasks::{LogTask, LOG_TASK_CLASS};

/// 持久化连接池大小
const PERSISTENCE_CONNECTIONS: u32 = 5;

/// 主应用程序
///
/// 持有任务存储与调度器。创建时即从持久化后端恢复任务，
/// 调用 [`Application::run`] 之后才开始触发。
pub struct Application {
    store: LocalTaskStore,
    scheduler: Arc<TaskScheduler>,
    registry: Arc<TaskRegistry>,
    executor: Arc<TaskExecutionHandler>,
    notifier: BroadcastNotifier,
    databases: Vec<DatabaseManager>,
}

impl Application {
    /// 按配置装配应用
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化调度引擎");
        let mut databases = Vec::new();

        let audit_log: Arc<dyn AuditLogRepository> = match config.audit.backend {
            AuditBackend::Memory => Arc::new(InMemoryAuditLogRepository::new()),
            AuditBackend::Sqlite => {
                let url = config
                    .audit
                    .database_url
                    .as_deref()
                    .context("SQLite审计日志缺少数据库URL")?;
                let db = DatabaseManager::new(url, config.audit.max_connections)
                    .await
                    .with_context(|| format!("连接审计日志数据库失败: {url}"))?;
                let repository = db.audit_log_repository();
                databases.push(db);
                Arc::new(repository)
            }
        };

        let store = match config.store.persistence_url.as_deref() {
            Some(url) => {
                let db = DatabaseManager::new(url, PERSISTENCE_CONNECTIONS)
                    .await
                    .with_context(|| format!("连接任务持久化数据库失败: {url}"))?;
                let store =
                    LocalTaskStore::with_persistence(config.store.clone(), Arc::new(db.job_persistence()));
                databases.push(db);
                let recovered = store.recover().await.context("恢复任务存储失败")?;
                info!("从持久化后端恢复 {} 个任务", recovered);
                store
            }
            None => LocalTaskStore::new(config.store.clone()),
        };

        let id_generator = match config.id_generator.machine_id {
            Some(machine_id) => SnowflakeIdGenerator::new(machine_id).context("创建ID生成器失败")?,
            None => SnowflakeIdGenerator::from_hostname(),
        };
        info!("ID生成器机器ID: {}", id_generator.machine_id());

        let notifier = BroadcastNotifier::new(config.notification.channel_capacity);
        let shared_notifier: Arc<dyn Notifier> = Arc::new(notifier.clone());

        let registry = Arc::new(TaskRegistry::new());
        registry.register(LOG_TASK_CLASS, Arc::new(LogTask)).await;

        let retry_handler = RetryHandler::new(Arc::new(store.clone()), Arc::clone(&shared_notifier));
        let executor = Arc::new(TaskExecutionHandler::new(
            Arc::clone(&registry),
            Arc::clone(&audit_log),
            retry_handler,
            shared_notifier,
        ));

        let scheduler = Arc::new(TaskScheduler::new(
            Arc::new(store.clone()),
            audit_log,
            Arc::new(id_generator),
        ));

        Ok(Self {
            store,
            scheduler,
            registry,
            executor,
            notifier,
            databases,
        })
    }

    pub fn scheduler(&self) -> Arc<TaskScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// 用于注册自定义任务类
    pub fn registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<String> {
        self.notifier.subscribe()
    }

    /// 启动触发循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let relay = tokio::spawn(relay_notifications(self.notifier.subscribe()));

        self.store
            .start(self.executor.clone())
            .await
            .context("启动任务存储失败")?;
        info!(
            "调度引擎已启动，已注册任务类: {:?}",
            self.registry.task_classes().await
        );

        let _ = shutdown_rx.recv().await;
        info!("停止调度引擎");

        self.stop().await;
        relay.abort();
        Ok(())
    }

    /// 停止触发并等待执行中的任务，然后关闭数据库连接
    pub async fn stop(&self) {
        self.store.shutdown().await;
        for db in &self.databases {
            db.close().await;
        }
    }
}

/// 把广播通知转发到日志
async fn relay_notifications(mut rx: broadcast::Receiver<String>) {
    loop {
        match rx.recv().await {
            Ok(message) => TracingNotifier.push(message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("通知处理过慢，丢弃 {} 条通知", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
