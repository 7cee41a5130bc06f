use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use scheduler_core::config::StoreConfig;
use scheduler_core::traits::{ExecutingJob, JobExecutionContext, JobExecutor, TaskStore};
use scheduler_core::{
    GroupMatcher, JobDataMap, JobDetail, SchedulerError, SchedulerResult, StoreTrigger, TaskKey,
    TriggerKey, TriggerState,
};

use super::persistence::JobPersistence;

#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<TaskKey, JobDetail>,
    triggers: HashMap<TriggerKey, StoreTrigger>,
    paused_job_groups: HashSet<String>,
}

impl StoreState {
    fn trigger_keys_of_job(&self, job_key: &TaskKey) -> Vec<TriggerKey> {
        self.triggers
            .values()
            .filter(|t| &t.job_key == job_key)
            .map(|t| t.key.clone())
            .collect()
    }

    /// 距离下一次触发的时间，没有可触发的触发器时为 `None`
    fn next_wakeup(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.triggers
            .values()
            .filter(|t| t.state == TriggerState::Normal)
            .filter_map(|t| t.next_fire_time)
            .min()
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

struct Runner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct StoreInner {
    config: StoreConfig,
    state: RwLock<StoreState>,
    executing: RwLock<HashMap<String, ExecutingJob>>,
    persistence: Option<Arc<dyn JobPersistence>>,
    wakeup: Notify,
    workers: Arc<Semaphore>,
    runner: Mutex<Option<Runner>>,
    fire_sequence: AtomicU64,
}

/// 进程内任务存储
///
/// 任务与触发器保存在内存中，触发循环在到期时把任务交给有界工作池执行。
/// 克隆得到的是同一个存储的句柄。
#[derive(Clone)]
pub struct LocalTaskStore {
    inner: Arc<StoreInner>,
}

impl LocalTaskStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::build(config, None)
    }

    /// 创建带写穿持久化的存储，启动前应先调用 [`LocalTaskStore::recover`]
    pub fn with_persistence(config: StoreConfig, persistence: Arc<dyn JobPersistence>) -> Self {
        Self::build(config, Some(persistence))
    }

    fn build(config: StoreConfig, persistence: Option<Arc<dyn JobPersistence>>) -> Self {
        let permits = config.thread_count.max(1);
        Self {
            inner: Arc::new(StoreInner {
                config,
                state: RwLock::new(StoreState::default()),
                executing: RwLock::new(HashMap::new()),
                persistence,
                wakeup: Notify::new(),
                workers: Arc::new(Semaphore::new(permits)),
                runner: Mutex::new(None),
                fire_sequence: AtomicU64::new(0),
            }),
        }
    }

    /// 从持久化后端恢复任务、触发器与暂停分组，返回恢复的任务数
    pub async fn recover(&self) -> SchedulerResult<usize> {
        let Some(persistence) = &self.inner.persistence else {
            return Ok(0);
        };

        let persisted = persistence.load().await?;
        let mut state = self.inner.state.write().await;

        for job in persisted.jobs {
            state.jobs.insert(job.key.clone(), job);
        }
        for trigger in persisted.triggers {
            if !state.jobs.contains_key(&trigger.job_key) {
                warn!("触发器 {} 引用的任务 {} 不存在，已忽略", trigger.key, trigger.job_key);
                continue;
            }
            // 已触发但执行结束前进程退出，不会再触发
            if trigger.state == TriggerState::Complete {
                info!("丢弃上次运行遗留的已完成触发器 {}", trigger.key);
                persistence.delete_trigger(&trigger.key).await?;
                continue;
            }
            state.triggers.insert(trigger.key.clone(), trigger);
        }
        state.paused_job_groups.extend(persisted.paused_groups);

        info!(
            "恢复任务存储: {} 个任务, {} 个触发器",
            state.jobs.len(),
            state.triggers.len()
        );
        self.inner.wakeup.notify_one();
        Ok(state.jobs.len())
    }

    /// 启动触发循环
    pub async fn start(&self, executor: Arc<dyn JobExecutor>) -> SchedulerResult<()> {
        let mut runner = self.inner.runner.lock().await;
        if runner.is_some() {
            return Err(SchedulerError::Internal("任务存储已经启动".to_string()));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            inner.run_loop(executor, shutdown_rx).await;
        });

        *runner = Some(Runner {
            shutdown: shutdown_tx,
            handle,
        });
        info!(
            "任务存储已启动，工作线程数: {}",
            self.inner.config.thread_count
        );
        Ok(())
    }

    pub async fn is_started(&self) -> bool {
        self.inner.runner.lock().await.is_some()
    }

    /// 停止触发循环，并等待正在执行的任务结束
    pub async fn shutdown(&self) {
        let runner = self.inner.runner.lock().await.take();
        let Some(runner) = runner else {
            return;
        };

        let _ = runner.shutdown.send(true);
        if let Err(e) = runner.handle.await {
            warn!("触发循环异常退出: {}", e);
        }

        let permits = u32::try_from(self.inner.config.thread_count.max(1)).unwrap_or(u32::MAX);
        match self.inner.workers.acquire_many(permits).await {
            Ok(all) => drop(all),
            Err(e) => warn!("等待执行中的任务失败: {}", e),
        }
        info!("任务存储已停止");
    }
}

impl StoreInner {
    async fn run_loop(self: Arc<Self>, executor: Arc<dyn JobExecutor>, mut shutdown: watch::Receiver<bool>) {
        let idle_wait = Duration::from_millis(self.config.idle_wait_ms);
        debug!("触发循环开始运行");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = self
                .fire_due_triggers(&executor)
                .await
                .map_or(idle_wait, |next| next.min(idle_wait));

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.wakeup.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }

        debug!("触发循环已退出");
    }

    /// 触发所有到期的触发器，返回距离下一次触发的时间
    async fn fire_due_triggers(self: &Arc<Self>, executor: &Arc<dyn JobExecutor>) -> Option<Duration> {
        let now = Utc::now();
        let threshold = ChronoDuration::from_std(Duration::from_millis(self.config.misfire_threshold_ms))
            .unwrap_or_else(|_| ChronoDuration::days(365));

        let mut fired = Vec::new();
        let next_wakeup = {
            let mut guard = self.state.write().await;
            let StoreState { jobs, triggers, .. } = &mut *guard;

            let mut due: Vec<(DateTime<Utc>, TriggerKey)> = triggers
                .values()
                .filter(|t| t.state == TriggerState::Normal)
                .filter_map(|t| t.next_fire_time.map(|next| (next, t.key.clone())))
                .collect();
            due.sort();

            let mut changed = Vec::new();
            for (_, key) in due {
                let Some(trigger) = triggers.get_mut(&key) else {
                    continue;
                };

                if trigger.is_misfired(now, threshold) {
                    info!(
                        "触发器 {} 错过触发时间 {:?}，按 {} 策略处理",
                        trigger.key,
                        trigger.next_fire_time,
                        trigger.misfire_instruction.as_str()
                    );
                    trigger.update_after_misfire(now);
                    changed.push(trigger.clone());
                }

                let Some(scheduled) = trigger.next_fire_time.filter(|next| *next <= now) else {
                    continue;
                };

                let Some(job) = jobs.get(&trigger.job_key) else {
                    warn!("触发器 {} 引用的任务 {} 不存在", trigger.key, trigger.job_key);
                    trigger.state = TriggerState::Error;
                    changed.push(trigger.clone());
                    continue;
                };

                trigger.triggered();
                if !trigger.may_fire_again() {
                    trigger.state = TriggerState::Complete;
                }
                changed.push(trigger.clone());
                fired.push((job.clone(), trigger.clone(), scheduled));
            }

            for trigger in &changed {
                self.persist_trigger(trigger).await;
            }

            guard.next_wakeup(now)
        };

        for (job, trigger, scheduled) in fired {
            self.spawn_execution(Arc::clone(executor), job, trigger, scheduled, now);
        }

        next_wakeup
    }

    fn spawn_execution(
        self: &Arc<Self>,
        executor: Arc<dyn JobExecutor>,
        job: JobDetail,
        trigger: StoreTrigger,
        scheduled_fire_time: DateTime<Utc>,
        fire_time: DateTime<Utc>,
    ) {
        let inner = Arc::clone(self);
        let fire_instance_id = format!(
            "{}-{}",
            fire_time.timestamp_millis(),
            self.fire_sequence.fetch_add(1, Ordering::Relaxed)
        );

        tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&inner.workers).acquire_owned().await else {
                warn!("工作池已关闭，放弃执行任务 {}", job.key);
                return;
            };

            let job_key = job.key.clone();
            let trigger_key = trigger.key.clone();
            inner.executing.write().await.insert(
                fire_instance_id.clone(),
                ExecutingJob {
                    fire_instance_id: fire_instance_id.clone(),
                    job_key: job_key.clone(),
                    trigger_key: trigger_key.clone(),
                    fire_time,
                },
            );

            debug!("开始执行任务 {}，触发器 {}", job_key, trigger_key);
            let context = JobExecutionContext {
                fire_instance_id: fire_instance_id.clone(),
                merged_data: job.data.merged_with(&trigger.data),
                job,
                trigger,
                scheduled_fire_time,
                fire_time,
            };

            // 在独立任务中执行，任务体panic不会影响工作池
            let result = match tokio::spawn(async move { executor.execute(context).await }).await {
                Ok(result) => result,
                Err(e) => Err(SchedulerError::TaskExecution(format!("任务执行异常终止: {e}"))),
            };

            inner.executing.write().await.remove(&fire_instance_id);
            inner.complete_execution(&job_key, &trigger_key, result).await;
        });
    }

    async fn complete_execution(
        &self,
        job_key: &TaskKey,
        trigger_key: &TriggerKey,
        result: SchedulerResult<()>,
    ) {
        let mut state = self.state.write().await;

        match result {
            Ok(()) => debug!("任务 {} 执行完成", job_key),
            Err(SchedulerError::TaskClassNotFound(class)) => {
                error!("任务 {} 的任务类 {} 未注册，触发器进入错误状态", job_key, class);
                for key in state.trigger_keys_of_job(job_key) {
                    if let Some(trigger) = state.triggers.get_mut(&key) {
                        trigger.state = TriggerState::Error;
                        let trigger = trigger.clone();
                        self.persist_trigger(&trigger).await;
                    }
                }
            }
            Err(e) => error!("任务 {} 执行失败: {}", job_key, e),
        }

        let finished = state
            .triggers
            .get(trigger_key)
            .is_some_and(|t| t.state == TriggerState::Complete);
        if finished {
            state.triggers.remove(trigger_key);
            if let Some(persistence) = &self.persistence {
                if let Err(e) = persistence.delete_trigger(trigger_key).await {
                    warn!("删除已完成的触发器 {} 失败: {}", trigger_key, e);
                }
            }
            debug!("触发器 {} 已完成并移除", trigger_key);
        }

        self.wakeup.notify_one();
    }

    async fn persist_trigger(&self, trigger: &StoreTrigger) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save_trigger(trigger).await {
                warn!("持久化触发器 {} 失败: {}", trigger.key, e);
            }
        }
    }

    /// 同名触发器仍可能触发时拒绝插入；已完成的同名触发器会被替换
    fn check_trigger_slot(state: &StoreState, key: &TriggerKey) -> SchedulerResult<()> {
        match state.triggers.get(key) {
            Some(existing) if existing.state != TriggerState::Complete => Err(
                SchedulerError::InvalidTrigger(format!("触发器已存在: {}", key)),
            ),
            Some(_) => {
                debug!("替换已完成的同名触发器 {}", key);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// 插入新触发器；所属分组处于暂停状态时新触发器同样暂停
    async fn insert_trigger(
        &self,
        state: &mut StoreState,
        mut trigger: StoreTrigger,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        Self::check_trigger_slot(state, &trigger.key)?;

        if state.paused_job_groups.contains(&trigger.job_key.group) {
            trigger.state = TriggerState::Paused;
        }

        if let Some(persistence) = &self.persistence {
            persistence.save_trigger(&trigger).await?;
        }

        let next = trigger.next_fire_time;
        debug!("添加触发器 {}，首次触发时间: {:?}", trigger.key, next);
        state.triggers.insert(trigger.key.clone(), trigger);
        self.wakeup.notify_one();
        Ok(next)
    }

    async fn set_job_paused(&self, state: &mut StoreState, job_key: &TaskKey, paused: bool) -> SchedulerResult<()> {
        for key in state.trigger_keys_of_job(job_key) {
            let Some(trigger) = state.triggers.get_mut(&key) else {
                continue;
            };

            let next_state = match (paused, trigger.state) {
                (_, TriggerState::Complete) => continue,
                (true, _) => TriggerState::Paused,
                (false, TriggerState::Paused) => TriggerState::Normal,
                (false, _) => continue,
            };
            trigger.state = next_state;

            if let Some(persistence) = &self.persistence {
                persistence.save_trigger(trigger).await?;
            }
        }

        if !paused {
            self.wakeup.notify_one();
        }
        Ok(())
    }

    fn matching_groups(state: &StoreState, matcher: &GroupMatcher) -> BTreeSet<String> {
        match matcher {
            GroupMatcher::Equals(group) => BTreeSet::from([group.clone()]),
            GroupMatcher::Any => state
                .jobs
                .keys()
                .map(|k| k.group.clone())
                .chain(state.paused_job_groups.iter().cloned())
                .collect(),
        }
    }
}

#[async_trait]
impl TaskStore for LocalTaskStore {
    async fn schedule_job(
        &self,
        job: JobDetail,
        trigger: StoreTrigger,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        if trigger.job_key != job.key {
            return Err(SchedulerError::InvalidTrigger(format!(
                "触发器 {} 不属于任务 {}",
                trigger.key, job.key
            )));
        }

        let mut state = self.inner.state.write().await;
        if state.jobs.contains_key(&job.key) {
            return Err(SchedulerError::InvalidArgument(format!("任务已存在: {}", job.key)));
        }
        StoreInner::check_trigger_slot(&state, &trigger.key)?;

        if let Some(persistence) = &self.inner.persistence {
            persistence.save_job(&job).await?;
        }
        info!("保存任务 {}，任务类: {}", job.key, job.task_class);
        state.jobs.insert(job.key.clone(), job);

        self.inner.insert_trigger(&mut state, trigger).await
    }

    async fn schedule_trigger(&self, trigger: StoreTrigger) -> SchedulerResult<Option<DateTime<Utc>>> {
        let mut state = self.inner.state.write().await;
        if !state.jobs.contains_key(&trigger.job_key) {
            return Err(SchedulerError::task_not_found(
                &trigger.job_key.group,
                &trigger.job_key.name,
            ));
        }
        self.inner.insert_trigger(&mut state, trigger).await
    }

    async fn update_job_data(&self, key: &TaskKey, data: JobDataMap) -> SchedulerResult<bool> {
        let mut state = self.inner.state.write().await;
        let Some(job) = state.jobs.get_mut(key) else {
            return Ok(false);
        };

        job.data = data;
        if let Some(persistence) = &self.inner.persistence {
            persistence.save_job(job).await?;
        }
        Ok(true)
    }

    async fn pause_job(&self, key: &TaskKey) -> SchedulerResult<()> {
        let mut state = self.inner.state.write().await;
        self.inner.set_job_paused(&mut state, key, true).await?;
        debug!("暂停任务 {}", key);
        Ok(())
    }

    async fn pause_jobs(&self, matcher: &GroupMatcher) -> SchedulerResult<Vec<String>> {
        let mut state = self.inner.state.write().await;
        let groups = StoreInner::matching_groups(&state, matcher);

        for group in &groups {
            if state.paused_job_groups.insert(group.clone()) {
                if let Some(persistence) = &self.inner.persistence {
                    persistence.save_paused_group(group).await?;
                }
            }

            let keys: Vec<TaskKey> = state.jobs.keys().filter(|k| &k.group == group).cloned().collect();
            for key in keys {
                self.inner.set_job_paused(&mut state, &key, true).await?;
            }
        }

        info!("暂停任务分组: {:?}", groups);
        Ok(groups.into_iter().collect())
    }

    async fn resume_job(&self, key: &TaskKey) -> SchedulerResult<()> {
        let mut state = self.inner.state.write().await;
        self.inner.set_job_paused(&mut state, key, false).await?;
        debug!("恢复任务 {}", key);
        Ok(())
    }

    async fn resume_jobs(&self, matcher: &GroupMatcher) -> SchedulerResult<Vec<String>> {
        let mut state = self.inner.state.write().await;
        let groups = StoreInner::matching_groups(&state, matcher);

        for group in &groups {
            if state.paused_job_groups.remove(group) {
                if let Some(persistence) = &self.inner.persistence {
                    persistence.delete_paused_group(group).await?;
                }
            }

            let keys: Vec<TaskKey> = state.jobs.keys().filter(|k| &k.group == group).cloned().collect();
            for key in keys {
                self.inner.set_job_paused(&mut state, &key, false).await?;
            }
        }

        info!("恢复任务分组: {:?}", groups);
        Ok(groups.into_iter().collect())
    }

    async fn delete_job(&self, key: &TaskKey) -> SchedulerResult<bool> {
        let mut state = self.inner.state.write().await;
        let Some(_) = state.jobs.remove(key) else {
            return Ok(false);
        };

        for trigger_key in state.trigger_keys_of_job(key) {
            state.triggers.remove(&trigger_key);
        }
        if let Some(persistence) = &self.inner.persistence {
            persistence.delete_job(key).await?;
        }

        info!("删除任务 {}", key);
        Ok(true)
    }

    async fn get_job_keys(&self, matcher: &GroupMatcher) -> SchedulerResult<HashSet<TaskKey>> {
        let state = self.inner.state.read().await;
        Ok(state
            .jobs
            .keys()
            .filter(|k| matcher.matches(&k.group))
            .cloned()
            .collect())
    }

    async fn get_triggers_of_job(&self, key: &TaskKey) -> SchedulerResult<Vec<StoreTrigger>> {
        let state = self.inner.state.read().await;
        let mut triggers: Vec<StoreTrigger> = state
            .triggers
            .values()
            .filter(|t| &t.job_key == key)
            .cloned()
            .collect();
        triggers.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(triggers)
    }

    async fn get_job_detail(&self, key: &TaskKey) -> SchedulerResult<Option<JobDetail>> {
        Ok(self.inner.state.read().await.jobs.get(key).cloned())
    }

    async fn get_trigger_state(&self, key: &TriggerKey) -> SchedulerResult<TriggerState> {
        let state = self.inner.state.read().await;
        Ok(state
            .triggers
            .get(key)
            .map_or(TriggerState::None, |t| t.state))
    }

    async fn job_group_names(&self) -> SchedulerResult<Vec<String>> {
        let state = self.inner.state.read().await;
        let groups: BTreeSet<String> = state.jobs.keys().map(|k| k.group.clone()).collect();
        Ok(groups.into_iter().collect())
    }

    async fn trigger_group_names(&self) -> SchedulerResult<Vec<String>> {
        let state = self.inner.state.read().await;
        let groups: BTreeSet<String> = state.triggers.keys().map(|k| k.group.clone()).collect();
        Ok(groups.into_iter().collect())
    }

    async fn currently_executing_jobs(&self) -> SchedulerResult<Vec<ExecutingJob>> {
        let executing = self.inner.executing.read().await;
        Ok(executing.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseManager;
    use scheduler_core::{MisfireInstruction, TriggerSchedule};
    use scheduler_testing_utils::TestEnv;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingExecutor {
        fired: StdMutex<Vec<JobExecutionContext>>,
        fail_with_missing_class: bool,
        delay: Option<Duration>,
    }

    impl RecordingExecutor {
        fn count(&self) -> usize {
            self.fired.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobExecutor for RecordingExecutor {
        async fn execute(&self, context: JobExecutionContext) -> SchedulerResult<()> {
            let class = context.job.task_class.clone();
            self.fired.lock().unwrap().push(context);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_with_missing_class {
                return Err(SchedulerError::TaskClassNotFound(class));
            }
            Ok(())
        }
    }

    fn config() -> StoreConfig {
        StoreConfig {
            thread_count: 4,
            misfire_threshold_ms: 60_000,
            idle_wait_ms: 50,
            persistence_url: None,
        }
    }

    fn job(name: &str, group: &str) -> JobDetail {
        JobDetail::new(TaskKey::new(name, group), "log")
    }

    fn once(name: &str, group: &str, start: DateTime<Utc>) -> StoreTrigger {
        StoreTrigger::new(
            TriggerKey::new(name, group),
            TaskKey::new(name, group),
            TriggerSchedule::Once,
            start,
            MisfireInstruction::FireNow,
        )
    }

    fn interval(name: &str, group: &str, start: DateTime<Utc>, period_ms: u64) -> StoreTrigger {
        StoreTrigger::new(
            TriggerKey::new(name, group),
            TaskKey::new(name, group),
            TriggerSchedule::Interval { period_ms },
            start,
            MisfireInstruction::RescheduleNowWithExistingCount,
        )
    }

    const WAIT: Duration = Duration::from_secs(3);

    #[tokio::test]
    async fn test_one_shot_fires_once_and_is_removed() {
        let store = LocalTaskStore::new(config());
        let executor = Arc::new(RecordingExecutor::default());
        store.start(executor.clone()).await.unwrap();

        let next = store
            .schedule_job(job("a", "g1"), once("a", "g1", Utc::now()))
            .await
            .unwrap();
        assert!(next.is_some());

        let key = TaskKey::new("a", "g1");
        assert!(
            TestEnv::wait_for(|| {
                let store = store.clone();
                let key = key.clone();
                async move { store.get_triggers_of_job(&key).await.unwrap().is_empty() }
            }, WAIT)
            .await
        );
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(executor.count(), 1);
        assert!(store.get_job_detail(&key).await.unwrap().is_some());
        assert_eq!(
            store.get_trigger_state(&TriggerKey::new("a", "g1")).await.unwrap(),
            TriggerState::None
        );
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_interval_fires_repeatedly() {
        let store = LocalTaskStore::new(config());
        let executor = Arc::new(RecordingExecutor::default());
        store.start(executor.clone()).await.unwrap();

        store
            .schedule_job(job("i", "g1"), interval("i", "g1", Utc::now(), 100))
            .await
            .unwrap();

        let executor_ref = executor.clone();
        assert!(TestEnv::wait_for(move || {
            let executor = executor_ref.clone();
            async move { executor.count() >= 3 }
        }, WAIT)
        .await);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_merged_data_prefers_trigger_values() {
        let store = LocalTaskStore::new(config());
        let executor = Arc::new(RecordingExecutor::default());
        store.start(executor.clone()).await.unwrap();

        let mut job_data = JobDataMap::new();
        job_data.put("who", "job");
        job_data.put("only_job", 1i64);
        let mut trigger_data = JobDataMap::new();
        trigger_data.put("who", "trigger");

        store
            .schedule_job(
                job("m", "g1").with_data(job_data),
                once("m", "g1", Utc::now()).with_data(trigger_data),
            )
            .await
            .unwrap();

        let executor_ref = executor.clone();
        assert!(TestEnv::wait_for(move || {
            let executor = executor_ref.clone();
            async move { executor.count() == 1 }
        }, WAIT)
        .await);

        let fired = executor.fired.lock().unwrap();
        assert_eq!(fired[0].merged_data.get_string("who"), Some("trigger"));
        assert_eq!(fired[0].merged_data.get_long("only_job"), Some(1));
        drop(fired);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_and_resume_job() {
        let store = LocalTaskStore::new(config());
        let start = Utc::now() + ChronoDuration::hours(1);
        store
            .schedule_job(job("p", "g1"), interval("p", "g1", start, 1_000))
            .await
            .unwrap();

        let key = TaskKey::new("p", "g1");
        let trigger_key = TriggerKey::new("p", "g1");

        store.pause_job(&key).await.unwrap();
        assert_eq!(store.get_trigger_state(&trigger_key).await.unwrap(), TriggerState::Paused);

        store.resume_job(&key).await.unwrap();
        assert_eq!(store.get_trigger_state(&trigger_key).await.unwrap(), TriggerState::Normal);

        // 不存在的任务不报错
        store.pause_job(&TaskKey::new("missing", "g1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_paused_trigger_does_not_fire() {
        let store = LocalTaskStore::new(config());
        let executor = Arc::new(RecordingExecutor::default());

        store
            .schedule_job(job("p", "g1"), interval("p", "g1", Utc::now() + ChronoDuration::milliseconds(200), 50))
            .await
            .unwrap();
        store.pause_job(&TaskKey::new("p", "g1")).await.unwrap();
        store.start(executor.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(executor.count(), 0);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_paused_group_applies_to_new_triggers() {
        let store = LocalTaskStore::new(config());
        let later = Utc::now() + ChronoDuration::hours(1);
        store.schedule_job(job("a", "g1"), once("a", "g1", later)).await.unwrap();
        store.schedule_job(job("b", "g2"), once("b", "g2", later)).await.unwrap();

        let paused = store.pause_jobs(&GroupMatcher::group_equals("g1")).await.unwrap();
        assert_eq!(paused, vec!["g1".to_string()]);

        let mut retry = once("a", "g1", later);
        retry.key = TriggerKey::new("a-retry-1", "g1");
        store.schedule_trigger(retry).await.unwrap();

        assert_eq!(
            store.get_trigger_state(&TriggerKey::new("a-retry-1", "g1")).await.unwrap(),
            TriggerState::Paused
        );
        assert_eq!(
            store.get_trigger_state(&TriggerKey::new("b", "g2")).await.unwrap(),
            TriggerState::Normal
        );

        store.resume_jobs(&GroupMatcher::group_equals("g1")).await.unwrap();
        for key in store.get_triggers_of_job(&TaskKey::new("a", "g1")).await.unwrap() {
            assert_eq!(key.state, TriggerState::Normal);
        }
    }

    #[tokio::test]
    async fn test_missing_task_class_moves_triggers_to_error() {
        let store = LocalTaskStore::new(config());
        let executor = Arc::new(RecordingExecutor {
            fail_with_missing_class: true,
            ..Default::default()
        });
        store.start(executor.clone()).await.unwrap();

        store
            .schedule_job(job("e", "g1"), interval("e", "g1", Utc::now(), 1_000))
            .await
            .unwrap();

        let trigger_key = TriggerKey::new("e", "g1");
        assert!(
            TestEnv::wait_for(|| {
                let store = store.clone();
                let key = trigger_key.clone();
                async move { store.get_trigger_state(&key).await.unwrap() == TriggerState::Error }
            }, WAIT)
            .await
        );

        let fired = executor.count();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(executor.count(), fired);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_misfired_interval_realigns_to_now() {
        let store = LocalTaskStore::new(config());
        let executor = Arc::new(RecordingExecutor::default());

        let start = Utc::now() - ChronoDuration::hours(2);
        store
            .schedule_job(job("late", "g1"), interval("late", "g1", start, 3_600_000))
            .await
            .unwrap();
        store.start(executor.clone()).await.unwrap();

        let executor_ref = executor.clone();
        assert!(TestEnv::wait_for(move || {
            let executor = executor_ref.clone();
            async move { executor.count() == 1 }
        }, WAIT)
        .await);

        let triggers = store.get_triggers_of_job(&TaskKey::new("late", "g1")).await.unwrap();
        let next = triggers[0].next_fire_time.unwrap();
        assert!(next > Utc::now() + ChronoDuration::minutes(59));
        assert_eq!(executor.count(), 1);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_job_and_group_names() {
        let store = LocalTaskStore::new(config());
        let later = Utc::now() + ChronoDuration::hours(1);
        store.schedule_job(job("a", "g1"), once("a", "g1", later)).await.unwrap();
        store.schedule_job(job("b", "g2"), once("b", "g2", later)).await.unwrap();

        assert_eq!(store.job_group_names().await.unwrap(), vec!["g1", "g2"]);
        assert_eq!(store.trigger_group_names().await.unwrap(), vec!["g1", "g2"]);

        assert!(store.delete_job(&TaskKey::new("a", "g1")).await.unwrap());
        assert!(!store.delete_job(&TaskKey::new("a", "g1")).await.unwrap());

        assert_eq!(store.job_group_names().await.unwrap(), vec!["g2"]);
        assert_eq!(store.trigger_group_names().await.unwrap(), vec!["g2"]);
        assert_eq!(store.get_job_keys(&GroupMatcher::any_group()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_orphan_triggers_rejected() {
        let store = LocalTaskStore::new(config());
        let later = Utc::now() + ChronoDuration::hours(1);
        store.schedule_job(job("a", "g1"), once("a", "g1", later)).await.unwrap();

        assert!(store.schedule_job(job("a", "g1"), once("a", "g1", later)).await.is_err());
        assert!(store.schedule_trigger(once("a", "g1", later)).await.is_err());

        let err = store.schedule_trigger(once("ghost", "g1", later)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn test_currently_executing_jobs() {
        let store = LocalTaskStore::new(config());
        let executor = Arc::new(RecordingExecutor {
            delay: Some(Duration::from_millis(400)),
            ..Default::default()
        });
        store.start(executor.clone()).await.unwrap();
        store.schedule_job(job("slow", "g1"), once("slow", "g1", Utc::now())).await.unwrap();

        assert!(
            TestEnv::wait_for(|| {
                let store = store.clone();
                async move { !store.currently_executing_jobs().await.unwrap().is_empty() }
            }, WAIT)
            .await
        );
        let running = store.currently_executing_jobs().await.unwrap();
        assert_eq!(running[0].job_key, TaskKey::new("slow", "g1"));

        store.shutdown().await;
        assert!(store.currently_executing_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_from_persistence() {
        let manager = DatabaseManager::new("sqlite::memory:", 1).await.unwrap();
        let persistence: Arc<dyn JobPersistence> = Arc::new(manager.job_persistence());
        let later = Utc::now() + ChronoDuration::hours(1);

        {
            let store = LocalTaskStore::with_persistence(config(), Arc::clone(&persistence));
            store.schedule_job(job("a", "g1"), once("a", "g1", later)).await.unwrap();
            store.schedule_job(job("b", "g2"), interval("b", "g2", later, 1_000)).await.unwrap();
            store.pause_jobs(&GroupMatcher::group_equals("g2")).await.unwrap();

            let mut data = JobDataMap::new();
            data.put("retry.count", 1i64);
            assert!(store.update_job_data(&TaskKey::new("a", "g1"), data).await.unwrap());
        }

        let restored = LocalTaskStore::with_persistence(config(), persistence);
        assert_eq!(restored.recover().await.unwrap(), 2);

        let job = restored.get_job_detail(&TaskKey::new("a", "g1")).await.unwrap().unwrap();
        assert_eq!(job.data.get_long("retry.count"), Some(1));
        assert_eq!(
            restored.get_trigger_state(&TriggerKey::new("b", "g2")).await.unwrap(),
            TriggerState::Paused
        );

        // 暂停分组同样被恢复
        let mut retry = once("b", "g2", later);
        retry.key = TriggerKey::new("b-retry-1", "g2");
        restored.schedule_trigger(retry).await.unwrap();
        assert_eq!(
            restored.get_trigger_state(&TriggerKey::new("b-retry-1", "g2")).await.unwrap(),
            TriggerState::Paused
        );
    }

    #[tokio::test]
    async fn test_start_twice_is_error() {
        let store = LocalTaskStore::new(config());
        let executor = Arc::new(RecordingExecutor::default());
        store.start(executor.clone()).await.unwrap();
        assert!(store.is_started().await);
        assert!(store.start(executor).await.is_err());
        store.shutdown().await;
        assert!(!store.is_started().await);
    }

    #[tokio::test]
    async fn test_interval_past_time_range_does_not_stall_loop() {
        let store = LocalTaskStore::new(config());
        let executor = Arc::new(RecordingExecutor::default());
        store.start(executor.clone()).await.unwrap();

        store
            .schedule_job(job("huge", "g1"), interval("huge", "g1", Utc::now(), i64::MAX as u64))
            .await
            .unwrap();
        store
            .schedule_job(job("after", "g1"), once("after", "g1", Utc::now()))
            .await
            .unwrap();

        let executor_ref = executor.clone();
        assert!(TestEnv::wait_for(move || {
            let executor = executor_ref.clone();
            async move { executor.count() == 2 }
        }, WAIT)
        .await);

        // 下次触发时间超出范围，触发器按已完成处理
        let huge = TaskKey::new("huge", "g1");
        assert!(
            TestEnv::wait_for(|| {
                let store = store.clone();
                let key = huge.clone();
                async move { store.get_triggers_of_job(&key).await.unwrap().is_empty() }
            }, WAIT)
            .await
        );
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_completed_trigger_name_can_be_reused() {
        let store = LocalTaskStore::new(config());
        let later = Utc::now() + ChronoDuration::hours(1);
        store.schedule_job(job("a", "g1"), once("a", "g1", later)).await.unwrap();

        let mut finished = once("a", "g1", later);
        finished.key = TriggerKey::new("a-retry-1", "g1");
        finished.state = TriggerState::Complete;
        store.schedule_trigger(finished).await.unwrap();

        let mut retry = once("a", "g1", later);
        retry.key = TriggerKey::new("a-retry-1", "g1");
        store.schedule_trigger(retry.clone()).await.unwrap();
        assert_eq!(
            store.get_trigger_state(&retry.key).await.unwrap(),
            TriggerState::Normal
        );

        // 仍会触发的同名触发器不可替换
        assert!(matches!(
            store.schedule_trigger(retry).await,
            Err(SchedulerError::InvalidTrigger(_))
        ));
    }

    #[tokio::test]
    async fn test_recover_discards_completed_triggers() {
        let manager = DatabaseManager::new("sqlite::memory:", 1).await.unwrap();
        let persistence: Arc<dyn JobPersistence> = Arc::new(manager.job_persistence());
        let later = Utc::now() + ChronoDuration::hours(1);

        persistence.save_job(&job("a", "g1")).await.unwrap();
        let mut fired = once("a", "g1", later);
        fired.key = TriggerKey::new("a-retry-1", "g1");
        fired.triggered();
        fired.state = TriggerState::Complete;
        persistence.save_trigger(&fired).await.unwrap();

        let store = LocalTaskStore::with_persistence(config(), Arc::clone(&persistence));
        assert_eq!(store.recover().await.unwrap(), 1);

        assert!(store.get_triggers_of_job(&TaskKey::new("a", "g1")).await.unwrap().is_empty());
        assert!(store.trigger_group_names().await.unwrap().is_empty());
        assert!(persistence.load().await.unwrap().triggers.is_empty());
    }
}
