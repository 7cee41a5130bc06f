//! 任务存储接口
//!
//! 任务存储持久化任务定义与触发器，并在合适的时间触发它们。
//! 任务与触发器以 `(name, group)` 标识，二者的命名空间相互独立；
//! 任务参数只能是原始类型的键值对。
//!
//! 存储拥有自己的工作线程池：触发后通过 [`JobExecutor`] 执行任务体，
//! 不会阻塞调用调度接口的线程。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::{GroupMatcher, JobDataMap, JobDetail, StoreTrigger, TaskKey, TriggerKey, TriggerState};
use crate::SchedulerResult;

/// 一次触发的执行上下文
#[derive(Debug, Clone)]
pub struct JobExecutionContext {
    /// 本次触发的唯一ID
    pub fire_instance_id: String,
    pub job: JobDetail,
    pub trigger: StoreTrigger,
    /// 任务参数被触发器参数覆盖后的结果
    pub merged_data: JobDataMap,
    /// 计划触发时间
    pub scheduled_fire_time: DateTime<Utc>,
    /// 实际触发时间
    pub fire_time: DateTime<Utc>,
}

/// 正在执行的任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutingJob {
    pub fire_instance_id: String,
    pub job_key: TaskKey,
    pub trigger_key: TriggerKey,
    pub fire_time: DateTime<Utc>,
}

/// 任务执行器
///
/// 存储在触发后调用。返回 `SchedulerError::TaskClassNotFound` 时，
/// 存储会把该任务的全部触发器置为 `Error` 状态。
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, context: JobExecutionContext) -> SchedulerResult<()>;
}

/// 任务存储接口
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 保存任务及其第一个触发器，返回首次触发时间
    async fn schedule_job(
        &self,
        job: JobDetail,
        trigger: StoreTrigger,
    ) -> SchedulerResult<Option<DateTime<Utc>>>;

    /// 为已存在的任务追加触发器；任务不存在时返回 `TaskNotFound`
    async fn schedule_trigger(&self, trigger: StoreTrigger) -> SchedulerResult<Option<DateTime<Utc>>>;

    /// 覆盖任务参数
    async fn update_job_data(&self, key: &TaskKey, data: JobDataMap) -> SchedulerResult<bool>;

    async fn pause_job(&self, key: &TaskKey) -> SchedulerResult<()>;

    /// 暂停匹配分组中的所有任务，返回被暂停的分组
    async fn pause_jobs(&self, matcher: &GroupMatcher) -> SchedulerResult<Vec<String>>;

    async fn resume_job(&self, key: &TaskKey) -> SchedulerResult<()>;

    /// 恢复匹配分组中的所有任务，返回被恢复的分组
    async fn resume_jobs(&self, matcher: &GroupMatcher) -> SchedulerResult<Vec<String>>;

    /// 删除任务及其全部触发器
    async fn delete_job(&self, key: &TaskKey) -> SchedulerResult<bool>;

    async fn get_job_keys(&self, matcher: &GroupMatcher) -> SchedulerResult<HashSet<TaskKey>>;

    async fn get_triggers_of_job(&self, key: &TaskKey) -> SchedulerResult<Vec<StoreTrigger>>;

    async fn get_job_detail(&self, key: &TaskKey) -> SchedulerResult<Option<JobDetail>>;

    /// 触发器不存在时返回 `TriggerState::None`
    async fn get_trigger_state(&self, key: &TriggerKey) -> SchedulerResult<TriggerState>;

    async fn job_group_names(&self) -> SchedulerResult<Vec<String>>;

    async fn trigger_group_names(&self) -> SchedulerResult<Vec<String>>;

    async fn currently_executing_jobs(&self) -> SchedulerResult<Vec<ExecutingJob>>;
}
