pub mod app_config;
pub mod audit;
pub mod observability;
pub mod store;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use audit::{AuditBackend, AuditConfig};
pub use observability::{IdGeneratorConfig, NotificationConfig, ObservabilityConfig};
pub use store::StoreConfig;
