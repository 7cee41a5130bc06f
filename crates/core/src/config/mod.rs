//! 配置管理
//!
//! 默认值 → TOML配置文件 → `SCHEDULER_` 前缀的环境变量，后者覆盖前者。

pub mod models;

pub use models::*;
