use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("任务未找到: {group}/{name}")]
    TaskNotFound { group: String, name: String },

    #[error("任务类型未注册: {0}")]
    TaskClassNotFound(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的触发器: {0}")]
    InvalidTrigger(String),

    #[error("无效的重试策略: {0}")]
    InvalidRetryPolicy(String),

    #[error("无效的参数: {0}")]
    InvalidArgument(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn task_not_found(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self::TaskNotFound {
            group: group.into(),
            name: name.into(),
        }
    }

    /// 配置类错误在构造阶段即被拒绝，不会进入执行路径
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidCron { .. }
                | SchedulerError::InvalidTrigger(_)
                | SchedulerError::InvalidRetryPolicy(_)
                | SchedulerError::InvalidArgument(_)
                | SchedulerError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;
