//! # Scheduler Testing Utils
//!
//! 调度引擎各crate共享的测试工具：
//!
//! - **Mocks**：记录通知的通知通道，以及成功、失败、先失败后成功、慢速等任务实现
//! - **Builders**：存储触发器与执行上下文的构建器
//! - **Helpers**：条件等待与测试配置
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
