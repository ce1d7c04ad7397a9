//! Configuration for the botty runtime.
//!
//! Settings are layered from defaults, config files, `BOTTY_*` environment
//! variables and programmatic overrides, then validated before use.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BottyConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, RegistryConfig, RuntimeConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
