//! Error types shared by the transport and storage ports.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors a [`BotClient`](crate::BotClient) may report.
///
/// `NotFound` and `NotModified` are not errors: they are modelled as
/// [`EditOutcome`](crate::EditOutcome) / [`DeleteOutcome`](crate::DeleteOutcome)
/// variants so the dispatcher can react to them.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The transport is not connected.
    #[error("bot is not connected")]
    NotConnected,
    /// The call timed out.
    #[error("API call timed out")]
    Timeout,
    /// The remote API rejected the call.
    #[error("API error ({code}): {message}")]
    Rejected { code: i64, message: String },
    /// Payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Creates a rejection error.
    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Creates an uncategorised error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors raised by a storage provider or one of its sessions.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The provider could not open a session.
    #[error("failed to open storage session: {0}")]
    Open(String),
    /// Committing pending work failed.
    #[error("failed to commit storage session: {0}")]
    Commit(String),
    /// The session was used after it was closed.
    #[error("storage session already closed")]
    Closed,
}

impl StorageError {
    /// Creates an open error.
    pub fn open(reason: impl Into<String>) -> Self {
        Self::Open(reason.into())
    }

    /// Creates a commit error.
    pub fn commit(reason: impl Into<String>) -> Self {
        Self::Commit(reason.into())
    }
}

// =============================================================================
// Update Errors
// =============================================================================

/// Errors raised while reading an [`Update`](crate::Update).
#[derive(Debug, Clone, Error)]
pub enum UpdateError {
    /// None of the update's parts carries a chat identifier.
    #[error("update {update_id} carries no chat identifier")]
    ConversationNotFound { update_id: i64 },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
