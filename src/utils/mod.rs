//! Configuration utilities.

/// TOML configuration file (`deepdive.toml`).
pub mod toml_config;

pub use toml_config::{ConfigError, DeepdiveConfig, SessionConfig};
