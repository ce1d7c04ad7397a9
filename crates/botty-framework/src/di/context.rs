//! Per-update resolution state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use botty_core::{BoxedStorageProvider, ConversationId, Session, StorageResult, Update};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::container::{CloseFn, ContextSlot};
use super::inject::Resolved;
use super::key::DependencyKey;
use crate::error::{ResolutionError, ResolutionResult};
use crate::reply::Reply;
use crate::request::{BotHandle, Request, RequestId};

/// Everything resolution needs for one update, plus the resources it opened.
///
/// The storage session is opened on first use. [`release`](Self::release)
/// commits it (on success) and closes it; dropping the context without
/// releasing closes it without committing, which covers cancellation.
pub struct ResolutionContext {
    request: Request,
    bot: BotHandle,
    reply: Reply,
    storage: Option<BoxedStorageProvider>,
    session: OnceCell<Session>,
    cache: Mutex<HashMap<DependencyKey, Resolved>>,
    closers: Mutex<Vec<(CloseFn, Resolved)>>,
    released: AtomicBool,
}

impl ResolutionContext {
    pub fn new(
        request: Request,
        bot: BotHandle,
        reply: Reply,
        storage: Option<BoxedStorageProvider>,
    ) -> Self {
        Self {
            request,
            bot,
            reply,
            storage,
            session: OnceCell::new(),
            cache: Mutex::new(HashMap::new()),
            closers: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }

    pub fn update(&self) -> &Update {
        &self.request.update
    }

    pub fn conversation(&self) -> ConversationId {
        self.request.conversation
    }

    pub fn request_id(&self) -> RequestId {
        self.request.id
    }

    /// Returns `true` once a storage session has been opened for this update.
    pub fn has_session(&self) -> bool {
        self.session.initialized()
    }

    pub(crate) fn cached(&self, key: &DependencyKey) -> Option<Resolved> {
        self.cache.lock().get(key).map(Arc::clone)
    }

    pub(crate) fn store(&self, key: DependencyKey, value: Resolved) {
        self.cache.lock().insert(key, value);
    }

    pub(crate) fn on_release(&self, close: CloseFn, value: Resolved) {
        self.closers.lock().push((close, value));
    }

    async fn session(&self) -> ResolutionResult<Session> {
        let session = self
            .session
            .get_or_try_init(|| async {
                let provider = self.storage.as_ref().ok_or(ResolutionError::MissingContext {
                    parameter: "Session",
                })?;
                let session = provider.open_session().await?;
                debug!(request_id = %self.request.id, "Opened storage session");
                Ok::<_, ResolutionError>(Session::new(session))
            })
            .await?;
        Ok(session.clone())
    }

    /// Reads a context object for this update.
    pub(crate) async fn context_value(&self, slot: ContextSlot) -> ResolutionResult<Resolved> {
        let update = &self.request.update;
        let missing = |parameter| ResolutionError::MissingContext { parameter };

        let value: Resolved = match slot {
            ContextSlot::Update => Arc::new(Update::clone(update)),
            ContextSlot::User => Arc::new(update.user.clone().ok_or(missing("User"))?),
            ContextSlot::Chat => Arc::new(update.chat.clone().ok_or(missing("Chat"))?),
            ContextSlot::Message => Arc::new(
                update
                    .message
                    .clone()
                    .ok_or(missing("IncomingMessage"))?,
            ),
            ContextSlot::CallbackQuery => Arc::new(
                update
                    .callback_query
                    .clone()
                    .ok_or(missing("CallbackQuery"))?,
            ),
            ContextSlot::Session => Arc::new(self.session().await?),
            ContextSlot::Bot => Arc::new(self.bot.clone()),
            ContextSlot::Captures => Arc::new(self.request.captures.clone()),
            ContextSlot::CommandArgs => Arc::new(self.request.args.clone()),
            ContextSlot::RequestId => Arc::new(self.request.id),
            ContextSlot::Reply => Arc::new(self.reply.clone()),
        };
        Ok(value)
    }

    /// Releases every resource opened for this update, exactly once.
    ///
    /// Closeable values are closed first, newest first, while the session is
    /// still open. The session is committed only when `success` is set. Later calls
    /// return `Ok(())` without doing anything.
    pub async fn release(&self, success: bool) -> StorageResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.teardown();

        let mut result = Ok(());
        if let Some(session) = self.session.get() {
            if success {
                result = session.inner().commit().await;
                if let Err(e) = &result {
                    warn!(request_id = %self.request.id, error = %e, "Storage commit failed");
                }
            }
            session.inner().close();
            debug!(request_id = %self.request.id, committed = success && result.is_ok(), "Closed storage session");
        }
        result
    }

    fn teardown(&self) {
        let closers = std::mem::take(&mut *self.closers.lock());
        for (close, value) in closers.into_iter().rev() {
            close(&value);
        }
        self.cache.lock().clear();
    }
}

impl Drop for ResolutionContext {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.teardown();
        if let Some(session) = self.session.get() {
            session.inner().close();
            debug!(request_id = %self.request.id, "Closed storage session of an unfinished update");
        }
    }
}

impl std::fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("request", &self.request)
            .field("has_session", &self.has_session())
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySession, MemoryStorage, RecordingBot, updates};

    fn context(storage: Option<Arc<MemoryStorage>>) -> ResolutionContext {
        let (reply, _outbox) = Reply::channel();
        ResolutionContext::new(
            Request::new(Arc::new(updates::text(5, "hi")), ConversationId(5)),
            BotHandle::new(Arc::new(RecordingBot::new())),
            reply,
            storage.map(|s| s as BoxedStorageProvider),
        )
    }

    #[tokio::test]
    async fn test_release_commits_once() {
        let storage = Arc::new(MemoryStorage::new());
        let ctx = context(Some(Arc::clone(&storage)));
        assert!(!ctx.has_session());

        ctx.context_value(ContextSlot::Session).await.unwrap();
        ctx.context_value(ContextSlot::Session).await.unwrap();
        assert_eq!(storage.opened(), 1);

        ctx.release(true).await.unwrap();
        ctx.release(true).await.unwrap();
        drop(ctx);
        assert_eq!(storage.committed(), 1);
        assert_eq!(storage.closed(), 1);
    }

    #[tokio::test]
    async fn test_drop_closes_without_commit() {
        let storage = Arc::new(MemoryStorage::new());
        let ctx = context(Some(Arc::clone(&storage)));
        ctx.context_value(ContextSlot::Session).await.unwrap();
        drop(ctx);

        assert_eq!(storage.committed(), 0);
        assert_eq!(storage.closed(), 1);
    }

    fn session_checker(session: Session, saw_open: Arc<AtomicBool>) -> CloseFn {
        Arc::new(move |_value: &Resolved| {
            let open = session
                .downcast_ref::<MemorySession>()
                .is_some_and(|s| !s.is_closed());
            saw_open.store(open, Ordering::SeqCst);
        })
    }

    async fn open_session(ctx: &ResolutionContext) -> Session {
        let value = ctx.context_value(ContextSlot::Session).await.unwrap();
        value.downcast_ref::<Session>().unwrap().clone()
    }

    #[tokio::test]
    async fn test_closeables_run_before_session_closes() {
        let storage = Arc::new(MemoryStorage::new());

        let ctx = context(Some(Arc::clone(&storage)));
        let session = open_session(&ctx).await;
        let on_release = Arc::new(AtomicBool::new(false));
        ctx.on_release(session_checker(session, Arc::clone(&on_release)), Arc::new(()));
        ctx.release(true).await.unwrap();
        assert!(on_release.load(Ordering::SeqCst));

        let ctx = context(Some(Arc::clone(&storage)));
        let session = open_session(&ctx).await;
        let on_drop = Arc::new(AtomicBool::new(false));
        ctx.on_release(session_checker(session, Arc::clone(&on_drop)), Arc::new(()));
        drop(ctx);
        assert!(on_drop.load(Ordering::SeqCst));
        assert_eq!(storage.closed(), 2);
    }

    #[tokio::test]
    async fn test_session_without_storage() {
        let ctx = context(None);
        let err = ctx.context_value(ContextSlot::Session).await.unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::MissingContext { parameter: "Session" }
        ));
        assert!(ctx.release(true).await.is_ok());
    }
}
