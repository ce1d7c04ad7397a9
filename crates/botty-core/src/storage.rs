//! Storage port.
//!
//! The framework never queries storage itself. It opens at most one
//! [`StorageSession`] per event, lazily, hands it to repository constructors
//! through [`Session`], and commits or closes it when the event is done.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageResult;

/// A unit of work against the storage engine.
#[async_trait]
pub trait StorageSession: Send + Sync + 'static {
    /// Persists pending work. Called once, only after a successful event.
    async fn commit(&self) -> StorageResult<()>;

    /// Releases the underlying connection. Called exactly once per session.
    fn close(&self);

    /// Access to the concrete session for repositories.
    fn as_any(&self) -> &dyn Any;
}

/// Opens storage sessions.
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    async fn open_session(&self) -> StorageResult<Arc<dyn StorageSession>>;
}

/// Shared, type-erased provider.
pub type BoxedStorageProvider = Arc<dyn StorageProvider>;

/// Handle to the storage session of the current event.
///
/// Cloning is cheap; every clone within one event refers to the same session.
#[derive(Clone)]
pub struct Session(Arc<dyn StorageSession>);

impl Session {
    pub fn new(inner: Arc<dyn StorageSession>) -> Self {
        Self(inner)
    }

    /// Downcasts to the concrete session type.
    pub fn downcast_ref<S: StorageSession>(&self) -> Option<&S> {
        self.0.as_any().downcast_ref::<S>()
    }

    pub fn inner(&self) -> &Arc<dyn StorageSession> {
        &self.0
    }

    /// Returns `true` if both handles refer to the same session.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Session").finish_non_exhaustive()
    }
}
