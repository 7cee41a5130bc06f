use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use scheduler_core::traits::ScheduledTask;

/// 任务类注册表
///
/// 按任务类名查找任务实现。触发时找不到任务类会使该任务的触发器进入错误状态。
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<dyn ScheduledTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, task_class: impl Into<String>, task: Arc<dyn ScheduledTask>) {
        let task_class = task_class.into();
        let mut tasks = self.tasks.write().await;
        if tasks.insert(task_class.clone(), task).is_some() {
            warn!("任务类 {} 已存在，将被覆盖", task_class);
        } else {
            debug!("注册任务类: {}", task_class);
        }
    }

    pub async fn unregister(&self, task_class: &str) -> bool {
        self.tasks.write().await.remove(task_class).is_some()
    }

    pub async fn get(&self, task_class: &str) -> Option<Arc<dyn ScheduledTask>> {
        self.tasks.read().await.get(task_class).cloned()
    }

    pub async fn contains(&self, task_class: &str) -> bool {
        self.tasks.read().await.contains_key(task_class)
    }

    /// 已注册的任务类，按名称排序
    pub async fn task_classes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scheduler_core::traits::TaskContext;
    use scheduler_core::SchedulerResult;

    struct Noop;

    #[async_trait]
    impl ScheduledTask for Noop {
        async fn run(&self, _context: &TaskContext) -> SchedulerResult<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = TaskRegistry::new();
        registry.register("b", Arc::new(Noop)).await;
        registry.register("a", Arc::new(Noop)).await;

        assert!(registry.contains("a").await);
        assert!(registry.get("missing").await.is_none());
        assert_eq!(registry.task_classes().await, vec!["a", "b"]);

        assert!(registry.unregister("a").await);
        assert!(!registry.unregister("a").await);
        assert!(!registry.contains("a").await);
    }
}
