//! Configuration loading, validation and env substitution.
//!
//! Config files: `chainscope.toml`, `chainscope.yaml`, or `chainscope.json`
//! Searched in `./` then `~/.config/chainscope/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config,
    },
    schema::{
        BrowserConfig, CacheConfig, ChainscopeConfig, MetricsConfig, RateLimitConfig,
        RetryConfig, ScrapeConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
