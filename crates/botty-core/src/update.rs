//! Incoming update model.
//!
//! An [`Update`] is the transport-neutral representation of one event the
//! bot receives. Only the parts that handlers actually consume are modelled;
//! each part is optional because a given event kind fills in a subset.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

/// Identifier of a conversation (a chat, group or channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Transport-assigned identifier of a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The user an update originates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Kind of chat an update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Private,
    Group,
    Supergroup,
    Channel,
}

/// The chat an update belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ConversationId,
    #[serde(rename = "type", default)]
    pub kind: ChatKind,
}

/// A text message received from a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: MessageId,
    pub chat_id: ConversationId,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
}

impl IncomingMessage {
    /// Splits a `/command@bot args` text into `("command", "args")`.
    ///
    /// Returns `None` when the message is not a command.
    pub fn command(&self) -> Option<(&str, &str)> {
        let text = self.text.as_deref()?.strip_prefix('/')?;
        let (head, args) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        let name = head.split_once('@').map_or(head, |(name, _)| name);
        if name.is_empty() {
            return None;
        }
        Some((name, args))
    }
}

/// An inline-button press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    pub user_id: i64,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub chat_id: Option<ConversationId>,
}

/// One incoming event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub edited_message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// Creates an empty update.
    pub fn new(update_id: i64) -> Self {
        Self {
            update_id,
            ..Default::default()
        }
    }

    /// Attaches the originating user.
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Attaches the chat.
    pub fn with_chat(mut self, chat: Chat) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Attaches a message.
    pub fn with_message(mut self, message: IncomingMessage) -> Self {
        self.message = Some(message);
        self
    }

    /// Attaches a callback query.
    pub fn with_callback_query(mut self, query: CallbackQuery) -> Self {
        self.callback_query = Some(query);
        self
    }

    /// Resolves the conversation this update belongs to.
    ///
    /// Looks at the message first, then the callback query, then the chat.
    pub fn conversation_id(&self) -> Result<ConversationId, UpdateError> {
        self.message
            .as_ref()
            .or(self.edited_message.as_ref())
            .map(|m| m.chat_id)
            .or_else(|| self.callback_query.as_ref().and_then(|q| q.chat_id))
            .or_else(|| self.chat.as_ref().map(|c| c.id))
            .ok_or(UpdateError::ConversationNotFound {
                update_id: self.update_id,
            })
    }

    /// Id of the originating user, if any.
    pub fn user_id(&self) -> Option<i64> {
        self.user
            .as_ref()
            .map(|u| u.id)
            .or_else(|| self.callback_query.as_ref().map(|q| q.user_id))
    }

    /// Parsed command of the message, if it carries one.
    pub fn command(&self) -> Option<(&str, &str)> {
        self.message.as_ref()?.command()
    }

    /// Text of the message, if any.
    pub fn text(&self) -> Option<&str> {
        self.message.as_ref()?.text.as_deref()
    }

    /// Data attached to the pressed inline button, if any.
    pub fn callback_data(&self) -> Option<&str> {
        self.callback_query.as_ref()?.data.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(chat: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            message_id: MessageId(1),
            chat_id: ConversationId(chat),
            date: Utc::now(),
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(message(1, "/start").command(), Some(("start", "")));
        assert_eq!(
            message(1, "/add@todo_bot  buy milk ").command(),
            Some(("add", "buy milk"))
        );
        assert_eq!(message(1, "hello").command(), None);
        assert_eq!(message(1, "/").command(), None);
    }

    #[test]
    fn test_conversation_fallback_order() {
        let update = Update::new(1)
            .with_chat(Chat {
                id: ConversationId(30),
                kind: ChatKind::Group,
            })
            .with_callback_query(CallbackQuery {
                id: "q".into(),
                data: None,
                user_id: 7,
                message_id: None,
                chat_id: Some(ConversationId(20)),
            });
        assert_eq!(update.conversation_id().unwrap(), ConversationId(20));

        let update = update.with_message(message(10, "hi"));
        assert_eq!(update.conversation_id().unwrap(), ConversationId(10));
    }

    #[test]
    fn test_conversation_missing() {
        let err = Update::new(42).conversation_id().unwrap_err();
        assert!(matches!(err, UpdateError::ConversationNotFound { update_id: 42 }));
    }

    #[test]
    fn test_deserialize_chat_type() {
        let chat: Chat = serde_json::from_str(r#"{"id": 5, "type": "supergroup"}"#).unwrap();
        assert_eq!(chat.kind, ChatKind::Supergroup);
        assert_eq!(chat.id, ConversationId(5));
    }
}
