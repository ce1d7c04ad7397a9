//! Error types for the botty framework.
//!
//! Errors fall in two groups. Registration errors are raised while routes
//! are compiled and must stop startup. Per-event errors are raised while one
//! update is handled and never leave that update's task.

use botty_core::{ApiError, StorageError};
use thiserror::Error;

use crate::handler::RoutineKind;

// =============================================================================
// Registration-time
// =============================================================================

/// A handler could not be registered.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A parameter (or one of its transitive dependencies) has no provider.
    #[error(
        "handler '{handler}': parameter #{parameter} of type '{type_name}' cannot be injected: {reason}"
    )]
    DependencyDeclaration {
        handler: String,
        /// 1-based position in the handler's parameter list.
        parameter: usize,
        type_name: &'static str,
        reason: String,
    },

    /// Dependencies refer to each other.
    #[error("handler '{handler}': cyclic dependency {cycle}")]
    CyclicDependency { handler: String, cycle: String },

    /// The handler cannot suspend.
    #[error("handler '{handler}': expected a {expected} routine, got a {actual} one. {suggestion}")]
    HandlerSignature {
        handler: String,
        expected: RoutineKind,
        actual: RoutineKind,
        suggestion: String,
    },

    /// A callback-data pattern is not a valid regular expression.
    #[error("handler '{handler}': invalid callback pattern '{pattern}': {source}")]
    InvalidPattern {
        handler: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A prefix route has an empty prefix or command name.
    #[error("handler '{handler}': prefix route '{route}' needs a prefix and non-empty names")]
    InvalidPrefix { handler: String, route: String },
}

/// Result type for registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

// =============================================================================
// Per-event
// =============================================================================

/// A dependency could not be produced for the current update.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// A context object is absent from this update.
    #[error("'{parameter}' is not available for this update")]
    MissingContext { parameter: &'static str },

    /// A factory or constructor failed.
    #[error("failed to construct '{dependency}': {source}")]
    Failure {
        dependency: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The storage provider could not open a session.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ResolutionError {
    pub fn failure(dependency: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Failure {
            dependency,
            source: source.into(),
        }
    }
}

/// Result type for dependency resolution.
pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// A response could not be dispatched.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport call failed. The registry is left untouched.
    #[error("transport {action} failed: {source}")]
    Transport {
        action: &'static str,
        #[source]
        source: ApiError,
    },

    /// The invocation the reply handle belongs to has finished.
    #[error("reply channel closed")]
    Closed,

    /// The detached dispatch task panicked or was aborted.
    #[error("dispatch task failed: {0}")]
    Task(String),
}

impl DispatchError {
    pub(crate) fn transport(action: &'static str, source: ApiError) -> Self {
        Self::Transport { action, source }
    }
}

/// One invocation failed.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// Resolution failed; the handler never ran and nothing was dispatched.
    #[error("handler '{handler}' skipped: {source}")]
    Skipped {
        handler: String,
        #[source]
        source: ResolutionError,
    },

    /// The handler returned an error after dispatching `dispatched` responses.
    #[error("handler '{handler}' failed after {dispatched} response(s): {source}")]
    Execution {
        handler: String,
        dispatched: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The handler succeeded but its storage session failed to commit.
    #[error("handler '{handler}' finished but commit failed: {source}")]
    Commit {
        handler: String,
        dispatched: usize,
        #[source]
        source: StorageError,
    },
}

impl InvocationError {
    /// Name of the handler that failed.
    pub fn handler(&self) -> &str {
        match self {
            Self::Skipped { handler, .. }
            | Self::Execution { handler, .. }
            | Self::Commit { handler, .. } => handler,
        }
    }

    /// Returns `true` if the handler never ran.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}
