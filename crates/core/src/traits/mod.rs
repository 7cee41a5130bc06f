pub mod audit_log;
pub mod id_generator;
pub mod notifier;
pub mod scheduled_task;
pub mod task_store;

pub use audit_log::*;
pub use id_generator::*;
pub use notifier::*;
pub use scheduled_task::*;
pub use task_store::*;
