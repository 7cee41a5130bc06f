//! 测试替身

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scheduler_core::traits::{Notifier, ScheduledTask, TaskContext};
use scheduler_core::{SchedulerError, SchedulerResult};

/// 记录所有通知的通知通道
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn push(&self, message: String) {
        self.messages.lock().unwrap().push(message);
    }
}

/// 总是成功的任务，记录每次执行的上下文
#[derive(Debug, Clone, Default)]
pub struct CountingTask {
    contexts: Arc<Mutex<Vec<TaskContext>>>,
}

impl CountingTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn contexts(&self) -> Vec<TaskContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduledTask for CountingTask {
    async fn run(&self, context: &TaskContext) -> SchedulerResult<Option<String>> {
        let mut contexts = self.contexts.lock().unwrap();
        contexts.push(context.clone());
        Ok(Some(format!("第 {} 次执行", contexts.len())))
    }
}

/// 前 `failures` 次执行失败，之后成功；`failures` 为 `usize::MAX` 时总是失败
#[derive(Debug, Clone)]
pub struct FlakyTask {
    failures: usize,
    calls: Arc<AtomicUsize>,
    retry_counts: Arc<Mutex<Vec<u32>>>,
}

impl FlakyTask {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
            retry_counts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次执行时看到的重试计数
    pub fn retry_counts(&self) -> Vec<u32> {
        self.retry_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduledTask for FlakyTask {
    async fn run(&self, context: &TaskContext) -> SchedulerResult<Option<String>> {
        self.retry_counts.lock().unwrap().push(context.retry_count);
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(SchedulerError::TaskExecution(format!("第 {call} 次执行失败")));
        }
        Ok(None)
    }
}

/// 执行耗时固定的任务
#[derive(Debug, Clone)]
pub struct SlowTask {
    duration: Duration,
}

impl SlowTask {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl ScheduledTask for SlowTask {
    async fn run(&self, _context: &TaskContext) -> SchedulerResult<Option<String>> {
        tokio::time::sleep(self.duration).await;
        Ok(None)
    }
}
