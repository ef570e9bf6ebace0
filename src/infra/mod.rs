//! Infrastructure - configuration and metrics
//!
//! - `config` - settings from flags, environment and an optional TOML file
//! - `metrics` - lock-free counters with periodic log reporting

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, ConfigArgs, ConfigError, LogFormat};
pub use metrics::{Metrics, MetricsSummary};
