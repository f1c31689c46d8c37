//! Configuration loading, validation, and env substitution.
//!
//! Config files: `chatrelay.toml`, `chatrelay.yaml`, `chatrelay.yml`, or
//! `chatrelay.json`, searched in `./` then the user config directory
//! (`~/.config/chatrelay/` on Linux).
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution anywhere in
//! the file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{Format, config_dir, discover_and_load, find_config_file, load_config},
    schema::{BridgeConfig, ChannelsConfig, HttpConfig, MetricsConfig, RelayConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
