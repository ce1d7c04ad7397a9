//! Runtime error types.

use botty_framework::RegistrationError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop an application from starting or running.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A handler failed validation; nothing was started.
    #[error("Handler registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("No bot client configured")]
    MissingBot,

    #[error("Session injection is enabled but no storage provider is configured")]
    MissingStorage,

    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
