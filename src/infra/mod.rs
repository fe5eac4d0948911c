//! Infrastructure - configuration, storage, notifications and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `credentials` - Key-value store and provider credentials
//! - `notify` - Advisory notifications for the presentation layer
//! - `metrics` - Lock-free provider metrics

pub mod config;
pub mod credentials;
pub mod metrics;
pub mod notify;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{
    seed_from_env, CredentialKey, Credentials, JsonFileStore, KeyValueStore, MapCredentials,
    MemoryStore,
};
pub use metrics::{MetricsSummary, ProviderMetrics};
pub use notify::{Notification, Notifier};
