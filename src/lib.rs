//! 任务调度引擎的进程装配
//!
//! 把配置、任务存储、审计日志、通知与调度器组装成一个可运行的 [`app::Application`]。

pub mod app;
pub mod shutdown;
pub mod tasks;
