//! Transport port.
//!
//! [`BotClient`] is the only way the framework talks to the chat platform.
//! Implementations wrap a concrete API client; the framework never performs
//! networking on its own.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::response::{Content, SendOptions};
use crate::update::{ConversationId, MessageId};

/// Result of an edit call that reached the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The message now shows the new content.
    Edited,
    /// The platform reported the content was already identical.
    NotModified,
    /// The message no longer exists.
    NotFound,
}

/// Result of a delete call that reached the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The message no longer exists.
    NotFound,
}

/// Outbound side of a chat-platform client.
#[async_trait]
pub trait BotClient: Send + Sync + 'static {
    /// Sends a new message and returns its transport id.
    async fn send_message(
        &self,
        conversation: ConversationId,
        content: &Content,
        options: &SendOptions,
    ) -> ApiResult<MessageId>;

    /// Replaces the content of a previously sent message.
    async fn edit_message(
        &self,
        conversation: ConversationId,
        message: MessageId,
        content: &Content,
        options: &SendOptions,
    ) -> ApiResult<EditOutcome>;

    /// Deletes a previously sent message.
    async fn delete_message(
        &self,
        conversation: ConversationId,
        message: MessageId,
    ) -> ApiResult<DeleteOutcome>;
}

/// Shared, type-erased client.
pub type BoxedBotClient = Arc<dyn BotClient>;
