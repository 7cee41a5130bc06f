use super::{DataValue, JobDataMap, RetryPolicy};

/// 调度请求中的任务描述
///
/// `group_id` 由调用方提供，任务ID在调度时生成。
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub group_id: String,
    pub task_class: String,
    pub description: Option<String>,
    pub parameters: JobDataMap,
    pub retry_policy: Option<RetryPolicy>,
}

impl TaskRequest {
    pub fn new(group_id: impl Into<String>, task_class: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            task_class: task_class.into(),
            description: None,
            parameters: JobDataMap::new(),
            retry_policy: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.parameters.put(key, value);
        self
    }

    pub fn with_parameters(mut self, parameters: JobDataMap) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}
