//! # Botty Core
//!
//! Foundation types shared by every layer of the botty framework.
//!
//! This crate owns no behaviour of its own. It defines:
//! - [`Update`] and its effective parts (user, chat, message, callback query)
//! - The response vocabulary handlers produce ([`Response`], [`Content`], [`SendOptions`])
//! - The transport port ([`BotClient`]) the dispatcher talks to
//! - The storage port ([`StorageProvider`], [`StorageSession`]) repositories are built on
//!
//! Concrete transports and storage engines live outside the framework and
//! implement the traits defined here.

pub mod client;
pub mod error;
pub mod response;
pub mod storage;
pub mod update;

pub use client::{BotClient, BoxedBotClient, DeleteOutcome, EditOutcome};
pub use error::{ApiError, ApiResult, StorageError, StorageResult, UpdateError};
pub use response::{
    Content, DiceEmoji, GeoPoint, InlineButton, InlineKeyboard, MediaSource, MessageKey, Metadata,
    ParseMode, PollKind, Response, SendOptions, fingerprint,
};
pub use storage::{BoxedStorageProvider, Session, StorageProvider, StorageSession};
pub use update::{
    CallbackQuery, Chat, ChatKind, ConversationId, IncomingMessage, MessageId, Update, User,
};
