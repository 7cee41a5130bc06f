use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info, instrument};

use scheduler_core::traits::{AuditLogRepository, IdGenerator, TaskStore};
use scheduler_core::{
    GroupMatcher, JobDetail, SchedulerError, SchedulerResult, TaskGroup, TaskKey, TaskRequest,
    TaskSchedule, Trigger, TriggerKey, TriggerState,
};

use crate::snapshot::SnapshotAssembler;
use crate::trigger_builder::{build_store_trigger, resend_trigger};

/// 单调时钟的纳秒读数，与雪花ID组合成任务ID
fn monotonic_nanos() -> u128 {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_nanos()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// 任务调度器
///
/// 对任务存储的一层线程安全包装，所有操作以分组为范围。
/// 每个任务在调度时生成唯一的任务ID，作为存储中任务与首个触发器的名称。
pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    audit_log: Arc<dyn AuditLogRepository>,
    id_generator: Arc<dyn IdGenerator>,
}

impl TaskScheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        audit_log: Arc<dyn AuditLogRepository>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            audit_log,
            id_generator,
        }
    }

    fn next_task_id(&self) -> String {
        format!("{}-{}", self.id_generator.next_id(), monotonic_nanos())
    }

    /// 调度一个任务，返回其在存储中的键
    #[instrument(skip(self, request, trigger), fields(group_id = %request.group_id, task_class = %request.task_class))]
    pub async fn schedule(&self, request: TaskRequest, trigger: Trigger) -> SchedulerResult<TaskKey> {
        if request.group_id.trim().is_empty() {
            return Err(SchedulerError::InvalidArgument("分组ID不能为空".to_string()));
        }
        if request.task_class.trim().is_empty() {
            return Err(SchedulerError::InvalidArgument("任务类不能为空".to_string()));
        }

        let task_id = self.next_task_id();
        let key = TaskKey::new(task_id.clone(), request.group_id.clone());

        let mut data = request.parameters;
        if let Some(policy) = &request.retry_policy {
            policy.encode(&mut data);
        }

        let mut job = JobDetail::new(key.clone(), request.task_class).with_data(data);
        job.description = request.description;

        let store_trigger = build_store_trigger(
            TriggerKey::new(task_id, request.group_id),
            key.clone(),
            &trigger,
            Utc::now(),
        )?;

        let next_fire_time = self.store.schedule_job(job, store_trigger).await?;
        counter!("scheduler_tasks_scheduled_total").increment(1);
        info!("任务 {} 已调度，首次触发时间: {:?}", key, next_fire_time);
        Ok(key)
    }

    /// 暂停单个任务；`task_id` 为空时暂停整个分组。返回受影响触发器中限制最严格的状态
    pub async fn pause(&self, group_id: &str, task_id: Option<&str>) -> SchedulerResult<TriggerState> {
        match non_blank(task_id) {
            Some(task_id) => {
                let key = TaskKey::new(task_id, group_id);
                self.store.pause_job(&key).await?;
                info!("暂停任务 {}", key);
                self.task_state(group_id, task_id).await
            }
            None => {
                self.store
                    .pause_jobs(&GroupMatcher::group_equals(group_id))
                    .await?;
                info!("暂停分组 {}", group_id);
                self.group_state(group_id).await
            }
        }
    }

    /// 恢复单个任务或整个分组，返回值同 [`TaskScheduler::pause`]
    pub async fn resume(&self, group_id: &str, task_id: Option<&str>) -> SchedulerResult<TriggerState> {
        match non_blank(task_id) {
            Some(task_id) => {
                let key = TaskKey::new(task_id, group_id);
                self.store.resume_job(&key).await?;
                info!("恢复任务 {}", key);
                self.task_state(group_id, task_id).await
            }
            None => {
                self.store
                    .resume_jobs(&GroupMatcher::group_equals(group_id))
                    .await?;
                info!("恢复分组 {}", group_id);
                self.group_state(group_id).await
            }
        }
    }

    /// 删除单个任务，返回删除数量
    pub async fn delete(&self, group_id: &str, task_id: &str) -> SchedulerResult<usize> {
        let deleted = self.store.delete_job(&TaskKey::new(task_id, group_id)).await?;
        Ok(usize::from(deleted))
    }

    /// 删除分组内的全部任务
    pub async fn delete_group(&self, group_id: &str) -> SchedulerResult<usize> {
        let keys = self.get_task_keys(group_id).await?;
        let deleted = self.delete_keys(keys).await?;
        info!("删除分组 {} 的 {} 个任务", group_id, deleted);
        Ok(deleted)
    }

    /// 删除存储中的全部任务
    pub async fn delete_all(&self) -> SchedulerResult<usize> {
        let keys = self.store.get_job_keys(&GroupMatcher::any_group()).await?;
        let deleted = self.delete_keys(keys).await?;
        info!("删除全部 {} 个任务", deleted);
        Ok(deleted)
    }

    async fn delete_keys(&self, keys: HashSet<TaskKey>) -> SchedulerResult<usize> {
        let mut deleted = 0;
        for key in keys {
            if self.store.delete_job(&key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// 全部分组及其代表性描述
    pub async fn groups(&self) -> SchedulerResult<Vec<TaskGroup>> {
        let keys = self.store.get_job_keys(&GroupMatcher::any_group()).await?;
        let mut by_group: BTreeMap<String, BTreeSet<TaskKey>> = BTreeMap::new();
        for key in keys {
            by_group.entry(key.group.clone()).or_default().insert(key);
        }

        let mut groups = Vec::with_capacity(by_group.len());
        for (group_id, keys) in by_group {
            let mut description = None;
            for key in &keys {
                if let Some(job) = self.store.get_job_detail(key).await? {
                    if job.description.is_some() {
                        description = job.description;
                        break;
                    }
                }
            }
            groups.push(TaskGroup {
                group_id,
                description,
            });
        }
        Ok(groups)
    }

    /// 通过新的一次性触发器立即重新执行已存在的任务
    pub async fn resend(&self, group_id: &str, task_id: &str) -> SchedulerResult<Option<DateTime<Utc>>> {
        let key = TaskKey::new(task_id, group_id);
        if self.store.get_job_detail(&key).await?.is_none() {
            return Err(SchedulerError::task_not_found(group_id, task_id));
        }

        let trigger_key = TriggerKey::new(
            format!("{}-resend-{}", task_id, self.id_generator.next_id()),
            group_id,
        );
        let next = self
            .store
            .schedule_trigger(resend_trigger(trigger_key, key.clone(), Utc::now()))
            .await?;
        info!("重新触发任务 {}", key);
        Ok(next)
    }

    /// 重新触发分组内的全部任务，返回触发数量
    pub async fn resend_group(&self, group_id: &str) -> SchedulerResult<usize> {
        let keys = self.get_task_keys(group_id).await?;
        for key in &keys {
            self.resend(&key.group, &key.name).await?;
        }
        Ok(keys.len())
    }

    /// 生成调度快照
    ///
    /// `executing` 为真时只包含正在执行的任务；`sort_by_fire_time` 为真时按下次触发时间升序，
    /// 不会再触发的任务排在最后。
    pub async fn all(
        &self,
        group_id: Option<&str>,
        executing: bool,
        sort_by_fire_time: bool,
    ) -> SchedulerResult<Vec<TaskSchedule>> {
        let group_id = non_blank(group_id);

        let mut keys: Vec<TaskKey> = if executing {
            self.store
                .currently_executing_jobs()
                .await?
                .into_iter()
                .map(|job| job.job_key)
                .filter(|key| group_id.map_or(true, |g| key.group == g))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        } else {
            let matcher = group_id.map_or_else(GroupMatcher::any_group, GroupMatcher::group_equals);
            self.store.get_job_keys(&matcher).await?.into_iter().collect()
        };
        keys.sort();

        let assembler = SnapshotAssembler::new(self.audit_log.as_ref(), self.id_generator.as_ref());
        let mut schedules = Vec::with_capacity(keys.len());
        for key in keys {
            // 任务可能在查询期间被删除
            let Some(job) = self.store.get_job_detail(&key).await? else {
                debug!("任务 {} 已不存在，跳过", key);
                continue;
            };
            let triggers = self.store.get_triggers_of_job(&key).await?;
            schedules.push(assembler.assemble(&job, &triggers).await);
        }

        if sort_by_fire_time {
            schedules.sort_by(|a, b| a.cmp_by_next_fire_time(b));
        }
        Ok(schedules)
    }

    /// 分组ID是否出现在任务分组或触发器分组中
    pub async fn exists(&self, group_id: &str) -> SchedulerResult<bool> {
        if self.store.job_group_names().await?.iter().any(|g| g == group_id) {
            return Ok(true);
        }
        Ok(self
            .store
            .trigger_group_names()
            .await?
            .iter()
            .any(|g| g == group_id))
    }

    /// 按分组名精确匹配（区分大小写）返回全部任务键
    pub async fn get_task_keys(&self, group_id: &str) -> SchedulerResult<HashSet<TaskKey>> {
        self.store
            .get_job_keys(&GroupMatcher::group_equals(group_id))
            .await
    }

    /// 单个任务的汇总状态，任务不存在时为 `None`
    pub async fn task_state(&self, group_id: &str, task_id: &str) -> SchedulerResult<TriggerState> {
        let triggers = self
            .store
            .get_triggers_of_job(&TaskKey::new(task_id, group_id))
            .await?;
        let mut states = Vec::with_capacity(triggers.len());
        for trigger in &triggers {
            states.push(self.store.get_trigger_state(&trigger.key).await?);
        }
        Ok(TriggerState::most_restrictive(states))
    }

    async fn group_state(&self, group_id: &str) -> SchedulerResult<TriggerState> {
        let mut states = Vec::new();
        for key in self.get_task_keys(group_id).await? {
            states.push(self.task_state(&key.group, &key.name).await?);
        }
        Ok(TriggerState::most_restrictive(states))
    }

    /// 单个任务的调度快照
    pub async fn snapshot(&self, group_id: &str, task_id: &str) -> SchedulerResult<Option<TaskSchedule>> {
        let key = TaskKey::new(task_id, group_id);
        let Some(job) = self.store.get_job_detail(&key).await? else {
            return Ok(None);
        };
        let triggers = self.store.get_triggers_of_job(&key).await?;
        let assembler = SnapshotAssembler::new(self.audit_log.as_ref(), self.id_generator.as_ref());
        Ok(Some(assembler.assemble(&job, &triggers).await))
    }
}
