//! Test doubles for the transport and storage ports.
//!
//! Enabled with the `testing` feature.
//!
//! ```rust,ignore
//! let bot = Arc::new(RecordingBot::new());
//! let app = AppBuilder::new().bot(bot.clone()).router(router).build()?;
//! app.handle(updates::command(42, "start", "")).await;
//! assert_eq!(bot.sends(), 1);
//! ```

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use botty_core::{
    ApiResult, BotClient, Content, ConversationId, DeleteOutcome, EditOutcome, MessageId,
    SendOptions, StorageError, StorageProvider, StorageResult, StorageSession,
};
use parking_lot::Mutex;

// =============================================================================
// RecordingBot
// =============================================================================

/// One call received by a [`RecordingBot`].
#[derive(Debug, Clone, PartialEq)]
pub enum BotCall {
    Send {
        conversation: ConversationId,
        content: Content,
        options: SendOptions,
    },
    Edit {
        conversation: ConversationId,
        message: MessageId,
        content: Content,
        options: SendOptions,
    },
    Delete {
        conversation: ConversationId,
        message: MessageId,
    },
}

impl BotCall {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::Edit { .. } => "edit",
            Self::Delete { .. } => "delete",
        }
    }

    pub fn conversation(&self) -> ConversationId {
        match self {
            Self::Send { conversation, .. }
            | Self::Edit { conversation, .. }
            | Self::Delete { conversation, .. } => *conversation,
        }
    }
}

/// In-memory [`BotClient`] that records every call in order.
///
/// Sends succeed with increasing message ids; edits and deletes succeed
/// unless an outcome has been scripted for them.
#[derive(Default)]
pub struct RecordingBot {
    calls: Mutex<Vec<BotCall>>,
    next_id: AtomicI64,
    latency: Option<Duration>,
    send_script: Mutex<VecDeque<ApiResult<MessageId>>>,
    edit_script: Mutex<VecDeque<ApiResult<EditOutcome>>>,
    delete_script: Mutex<VecDeque<ApiResult<DeleteOutcome>>>,
}

impl RecordingBot {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Makes every call wait `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues the result of the next send.
    pub fn script_send(&self, result: ApiResult<MessageId>) {
        self.send_script.lock().push_back(result);
    }

    /// Queues the result of the next edit.
    pub fn script_edit(&self, result: ApiResult<EditOutcome>) {
        self.edit_script.lock().push_back(result);
    }

    /// Queues the result of the next delete.
    pub fn script_delete(&self, result: ApiResult<DeleteOutcome>) {
        self.delete_script.lock().push_back(result);
    }

    pub fn calls(&self) -> Vec<BotCall> {
        self.calls.lock().clone()
    }

    /// Calls made for one conversation.
    pub fn calls_for(&self, conversation: ConversationId) -> Vec<BotCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.conversation() == conversation)
            .cloned()
            .collect()
    }

    fn count(&self, kind: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.kind() == kind).count()
    }

    pub fn sends(&self) -> usize {
        self.count("send")
    }

    pub fn edits(&self) -> usize {
        self.count("edit")
    }

    pub fn deletes(&self) -> usize {
        self.count("delete")
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl BotClient for RecordingBot {
    async fn send_message(
        &self,
        conversation: ConversationId,
        content: &Content,
        options: &SendOptions,
    ) -> ApiResult<MessageId> {
        self.calls.lock().push(BotCall::Send {
            conversation,
            content: content.clone(),
            options: options.clone(),
        });
        self.wait().await;
        let scripted = self.send_script.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst))))
    }

    async fn edit_message(
        &self,
        conversation: ConversationId,
        message: MessageId,
        content: &Content,
        options: &SendOptions,
    ) -> ApiResult<EditOutcome> {
        self.calls.lock().push(BotCall::Edit {
            conversation,
            message,
            content: content.clone(),
            options: options.clone(),
        });
        self.wait().await;
        let scripted = self.edit_script.lock().pop_front();
        scripted.unwrap_or(Ok(EditOutcome::Edited))
    }

    async fn delete_message(
        &self,
        conversation: ConversationId,
        message: MessageId,
    ) -> ApiResult<DeleteOutcome> {
        self.calls.lock().push(BotCall::Delete {
            conversation,
            message,
        });
        self.wait().await;
        let scripted = self.delete_script.lock().pop_front();
        scripted.unwrap_or(Ok(DeleteOutcome::Deleted))
    }
}

// =============================================================================
// MemoryStorage
// =============================================================================

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    committed: AtomicUsize,
    closed: AtomicUsize,
}

/// [`StorageProvider`] whose sessions only count what happens to them.
#[derive(Default)]
pub struct MemoryStorage {
    counters: Arc<Counters>,
    fail_commit: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every commit fail.
    pub fn failing_commit() -> Self {
        Self {
            fail_commit: true,
            ..Default::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.counters.committed.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

/// Session handed out by [`MemoryStorage`].
pub struct MemorySession {
    counters: Arc<Counters>,
    fail_commit: bool,
    closed: std::sync::atomic::AtomicBool,
}

impl MemorySession {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageSession for MemorySession {
    async fn commit(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        if self.fail_commit {
            return Err(StorageError::commit("disk full"));
        }
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn open_session(&self) -> StorageResult<Arc<dyn StorageSession>> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySession {
            counters: Arc::clone(&self.counters),
            fail_commit: self.fail_commit,
            closed: Default::default(),
        }))
    }
}

// =============================================================================
// Update builders
// =============================================================================

/// Builders for common updates.
pub mod updates {
    use std::sync::atomic::{AtomicI64, Ordering};

    use botty_core::{
        CallbackQuery, Chat, ChatKind, ConversationId, IncomingMessage, MessageId, Update, User,
    };
    use chrono::Utc;

    static NEXT_UPDATE: AtomicI64 = AtomicI64::new(1);

    fn base(chat: i64) -> Update {
        Update::new(NEXT_UPDATE.fetch_add(1, Ordering::Relaxed))
            .with_user(User {
                id: chat,
                first_name: "Tester".into(),
                username: Some("tester".into()),
            })
            .with_chat(Chat {
                id: ConversationId(chat),
                kind: ChatKind::Private,
            })
    }

    /// A text message in `chat`.
    pub fn text(chat: i64, text: &str) -> Update {
        base(chat).with_message(IncomingMessage {
            message_id: MessageId(1),
            chat_id: ConversationId(chat),
            date: Utc::now(),
            text: Some(text.to_string()),
        })
    }

    /// A `/name args` command in `chat`.
    pub fn command(chat: i64, name: &str, args: &str) -> Update {
        let text = if args.is_empty() {
            format!("/{name}")
        } else {
            format!("/{name} {args}")
        };
        self::text(chat, &text)
    }

    /// An inline-button press carrying `data` in `chat`.
    pub fn callback(chat: i64, data: &str) -> Update {
        base(chat).with_callback_query(CallbackQuery {
            id: format!("cb-{chat}"),
            data: Some(data.to_string()),
            user_id: chat,
            message_id: None,
            chat_id: Some(ConversationId(chat)),
        })
    }

    /// An update with no user, e.g. a channel post.
    pub fn anonymous(chat: i64, text: &str) -> Update {
        Update {
            user: None,
            ..self::text(chat, text)
        }
    }
}
