//! Response dispatching.
//!
//! Turns one [`Response`] into transport calls and keeps the
//! [`MessageRegistry`] in step with what the conversation shows.
//!
//! | Response | Entry present                    | Entry absent                 |
//! |----------|----------------------------------|------------------------------|
//! | send     | send, replace entry              | send, record entry           |
//! | edit     | edit entry (skipped if unchanged)| send instead, record entry   |
//! | delete   | delete, forget entry             | nothing                      |
//!
//! An edit or delete that the platform answers with `NotFound` forgets the
//! entry and is not retried as a send.
//!
//! An edit looks for its message by explicit transport id, then explicit
//! key, then the key of the handler it targets, then the producing
//! handler's own key.

use std::sync::Arc;

use botty_core::{
    BoxedBotClient, Content, ConversationId, DeleteOutcome, EditOutcome, MessageId, MessageKey,
    Metadata, Response, SendOptions, fingerprint,
};
use tracing::{debug, info, instrument};

use crate::error::DispatchError;
use crate::registry::MessageRegistry;

/// What a dispatched response did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A new message was sent.
    Sent(MessageId),
    /// An edit found nothing to edit and was sent as a new message instead.
    FallbackSent(MessageId),
    /// The message was edited.
    Edited(MessageId),
    /// The message already showed this content; nothing changed.
    Unchanged(MessageId),
    /// The message was deleted.
    Deleted(MessageId),
    /// The platform no longer has the message; its entry was dropped.
    Stale,
    /// A delete found nothing to delete.
    Skipped,
}

impl DispatchOutcome {
    /// Transport id of the message the response ended on, if any.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::Sent(id)
            | Self::FallbackSent(id)
            | Self::Edited(id)
            | Self::Unchanged(id)
            | Self::Deleted(id) => Some(*id),
            Self::Stale | Self::Skipped => None,
        }
    }
}

/// Where a response is dispatched from.
#[derive(Debug, Clone)]
pub struct DispatchScope {
    pub conversation: ConversationId,
    /// Key used when a response names none; derived from the handler.
    pub implicit_key: MessageKey,
}

impl DispatchScope {
    /// Key a send or delete acts on: the explicit key, then the target
    /// handler's key, then the implicit one.
    fn key_for(&self, response: &Response) -> MessageKey {
        match (response.explicit_key(), response.target_handler()) {
            (Some(key), _) => key.clone(),
            (None, Some(handler)) => MessageKey::new(handler),
            (None, None) => self.implicit_key.clone(),
        }
    }

    /// Keys an edit looks up, in order. The first is recorded when none
    /// has an entry.
    fn edit_keys(&self, response: &Response) -> Vec<MessageKey> {
        let mut keys = vec![self.key_for(response)];
        if response.explicit_key().is_none() && keys[0] != self.implicit_key {
            keys.push(self.implicit_key.clone());
        }
        keys
    }
}

/// Issues transport calls for responses and maintains the registry.
#[derive(Clone)]
pub struct ResponseDispatcher {
    registry: Arc<MessageRegistry>,
    bot: BoxedBotClient,
}

impl ResponseDispatcher {
    pub fn new(registry: Arc<MessageRegistry>, bot: BoxedBotClient) -> Self {
        Self { registry, bot }
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    pub fn bot(&self) -> &BoxedBotClient {
        &self.bot
    }

    /// Dispatches one response.
    #[instrument(
        name = "dispatch",
        skip_all,
        fields(kind = response.kind(), conversation = %scope.conversation, key = %scope.key_for(response))
    )]
    pub async fn dispatch(
        &self,
        response: &Response,
        scope: &DispatchScope,
    ) -> Result<DispatchOutcome, DispatchError> {
        match response {
            Response::Send {
                content,
                options,
                metadata,
                ..
            } => {
                let key = scope.key_for(response);
                let id = self
                    .send(scope.conversation, key, content, options, metadata.clone())
                    .await?;
                Ok(DispatchOutcome::Sent(id))
            }
            Response::Edit {
                content,
                options,
                message_id,
                metadata,
                ..
            } => {
                let edit = Edit {
                    keys: scope.edit_keys(response),
                    explicit: *message_id,
                    content,
                    options,
                    metadata,
                };
                self.edit(scope.conversation, edit).await
            }
            Response::Delete { .. } => {
                self.delete(scope.conversation, &scope.key_for(response))
                    .await
            }
        }
    }

    async fn send(
        &self,
        conversation: ConversationId,
        key: MessageKey,
        content: &Content,
        options: &SendOptions,
        metadata: Metadata,
    ) -> Result<MessageId, DispatchError> {
        let id = self
            .bot
            .send_message(conversation, content, options)
            .await
            .map_err(|e| DispatchError::transport("send", e))?;
        self.registry.record_with(
            conversation,
            key,
            id,
            Some(fingerprint(content, options)),
            metadata,
        );
        debug!(message_id = %id, content = content.kind(), "Sent message");
        Ok(id)
    }

    async fn edit(
        &self,
        conversation: ConversationId,
        edit: Edit<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let hash = fingerprint(edit.content, edit.options);
        let found = edit.keys.iter().find_map(|key| {
            self.registry
                .entry(conversation, key.as_str())
                .map(|entry| (key, entry))
        });
        let (key, previous) = match found {
            Some((key, entry)) => (key.clone(), Some(entry)),
            None => (edit.keys[0].clone(), None),
        };
        let metadata = match &previous {
            Some(entry) if edit.metadata.is_empty() => entry.metadata.clone(),
            _ => edit.metadata.clone(),
        };

        let target = match (edit.explicit, previous) {
            (Some(id), _) => id,
            (None, Some(entry)) if entry.content_hash == Some(hash) => {
                if metadata == entry.metadata {
                    self.registry.touch(conversation, key.as_str());
                } else {
                    self.registry
                        .record_with(conversation, key, entry.message_id, Some(hash), metadata);
                }
                debug!(message_id = %entry.message_id, "Content unchanged, edit skipped");
                return Ok(DispatchOutcome::Unchanged(entry.message_id));
            }
            (None, Some(entry)) => entry.message_id,
            (None, None) => {
                info!(%key, "No message registered to edit, sending a new one instead");
                let id = self
                    .send(conversation, key, edit.content, edit.options, metadata)
                    .await?;
                return Ok(DispatchOutcome::FallbackSent(id));
            }
        };

        let outcome = self
            .bot
            .edit_message(conversation, target, edit.content, edit.options)
            .await
            .map_err(|e| DispatchError::transport("edit", e))?;

        match outcome {
            EditOutcome::Edited => {
                self.registry
                    .record_with(conversation, key, target, Some(hash), metadata);
                debug!(message_id = %target, "Edited message");
                Ok(DispatchOutcome::Edited(target))
            }
            EditOutcome::NotModified => {
                self.registry
                    .record_with(conversation, key, target, Some(hash), metadata);
                debug!(message_id = %target, "Platform reported message not modified");
                Ok(DispatchOutcome::Unchanged(target))
            }
            EditOutcome::NotFound => {
                self.registry.remove_if(conversation, key.as_str(), target);
                info!(message_id = %target, "Message to edit no longer exists, entry dropped");
                Ok(DispatchOutcome::Stale)
            }
        }
    }

    async fn delete(
        &self,
        conversation: ConversationId,
        key: &MessageKey,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(target) = self.registry.lookup(conversation, key.as_str()) else {
            debug!("Nothing registered under this key, delete skipped");
            return Ok(DispatchOutcome::Skipped);
        };

        let outcome = self
            .bot
            .delete_message(conversation, target)
            .await
            .map_err(|e| DispatchError::transport("delete", e))?;
        self.registry.remove_if(conversation, key.as_str(), target);

        match outcome {
            DeleteOutcome::Deleted => {
                debug!(message_id = %target, "Deleted message");
                Ok(DispatchOutcome::Deleted(target))
            }
            DeleteOutcome::NotFound => {
                info!(message_id = %target, "Message to delete no longer exists, entry dropped");
                Ok(DispatchOutcome::Stale)
            }
        }
    }
}

/// An edit with its lookup order resolved.
struct Edit<'a> {
    /// Never empty.
    keys: Vec<MessageKey>,
    explicit: Option<MessageId>,
    content: &'a Content,
    options: &'a SendOptions,
    metadata: &'a Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BotCall, RecordingBot};
    use botty_core::ApiError;

    const CHAT: ConversationId = ConversationId(7);

    fn setup() -> (Arc<RecordingBot>, ResponseDispatcher) {
        let bot = Arc::new(RecordingBot::new());
        let dispatcher =
            ResponseDispatcher::new(Arc::new(MessageRegistry::default()), bot.clone() as BoxedBotClient);
        (bot, dispatcher)
    }

    fn scope() -> DispatchScope {
        DispatchScope {
            conversation: CHAT,
            implicit_key: "handler".into(),
        }
    }

    #[tokio::test]
    async fn test_send_records_entry() {
        let (bot, dispatcher) = setup();
        let outcome = dispatcher
            .dispatch(&Response::send("hi").key("a"), &scope())
            .await
            .unwrap();

        let id = outcome.message_id().unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent(id));
        assert_eq!(dispatcher.registry().lookup(CHAT, "a"), Some(id));
        assert_eq!(bot.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_implicit_key() {
        let (_bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("hi"), &scope())
            .await
            .unwrap();
        assert!(dispatcher.registry().lookup(CHAT, "handler").is_some());
    }

    #[tokio::test]
    async fn test_edit_without_prior_send_falls_back() {
        let (bot, dispatcher) = setup();
        let outcome = dispatcher
            .dispatch(&Response::edit("hi").key("k"), &scope())
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::FallbackSent(_)));
        assert_eq!(bot.sends(), 1);
        assert_eq!(bot.edits(), 0);
        assert_eq!(
            dispatcher.registry().lookup(CHAT, "k"),
            outcome.message_id()
        );
    }

    #[tokio::test]
    async fn test_identical_edit_is_idempotent() {
        let (bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("v1").key("k"), &scope())
            .await
            .unwrap();
        let id = dispatcher.registry().lookup(CHAT, "k");

        let first = dispatcher
            .dispatch(&Response::edit("v2").key("k"), &scope())
            .await
            .unwrap();
        let second = dispatcher
            .dispatch(&Response::edit("v2").key("k"), &scope())
            .await
            .unwrap();

        assert!(matches!(first, DispatchOutcome::Edited(_)));
        assert!(matches!(second, DispatchOutcome::Unchanged(_)));
        assert_eq!(dispatcher.registry().lookup(CHAT, "k"), id);
        assert_eq!(bot.edits(), 1);
    }

    #[tokio::test]
    async fn test_not_modified_counts_as_unchanged() {
        let (bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("v1").key("k"), &scope())
            .await
            .unwrap();
        bot.script_edit(Ok(EditOutcome::NotModified));

        let outcome = dispatcher
            .dispatch(&Response::edit("v1 again").key("k"), &scope())
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Unchanged(_)));
    }

    #[tokio::test]
    async fn test_edit_not_found_drops_entry_without_resend() {
        let (bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("v1").key("k"), &scope())
            .await
            .unwrap();
        bot.script_edit(Ok(EditOutcome::NotFound));

        let outcome = dispatcher
            .dispatch(&Response::edit("v2").key("k"), &scope())
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Stale);
        assert_eq!(dispatcher.registry().lookup(CHAT, "k"), None);
        assert_eq!(bot.sends(), 1);
    }

    #[tokio::test]
    async fn test_explicit_message_id_wins() {
        let (bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("v1").key("k"), &scope())
            .await
            .unwrap();

        dispatcher
            .dispatch(
                &Response::edit("v2").key("k").message_id(MessageId(999)),
                &scope(),
            )
            .await
            .unwrap();

        assert!(matches!(
            bot.calls().last(),
            Some(BotCall::Edit {
                message: MessageId(999),
                ..
            })
        ));
        assert_eq!(
            dispatcher.registry().lookup(CHAT, "k"),
            Some(MessageId(999))
        );
    }

    #[tokio::test]
    async fn test_edit_targets_named_handler_first() {
        let (bot, dispatcher) = setup();
        let menu = dispatcher
            .dispatch(&Response::send("menu").key("show_menu"), &scope())
            .await
            .unwrap();
        dispatcher
            .dispatch(&Response::send("own"), &scope())
            .await
            .unwrap();

        let outcome = dispatcher
            .dispatch(&Response::edit("menu v2").handler("show_menu"), &scope())
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Edited(menu.message_id().unwrap()));
        assert!(matches!(
            bot.calls().last(),
            Some(BotCall::Edit { message, .. }) if Some(*message) == menu.message_id()
        ));
    }

    #[tokio::test]
    async fn test_edit_for_silent_handler_falls_back_to_own_message() {
        let (bot, dispatcher) = setup();
        let own = dispatcher
            .dispatch(&Response::send("own"), &scope())
            .await
            .unwrap();

        let outcome = dispatcher
            .dispatch(&Response::edit("own v2").handler("never_sent"), &scope())
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Edited(own.message_id().unwrap()));

        let registry = dispatcher.registry();
        registry.clear(CHAT);
        let outcome = dispatcher
            .dispatch(&Response::edit("fresh").handler("never_sent"), &scope())
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::FallbackSent(_)));
        assert_eq!(registry.lookup(CHAT, "never_sent"), outcome.message_id());
        assert_eq!(bot.sends(), 2);
    }

    #[tokio::test]
    async fn test_explicit_key_beats_handler_target() {
        let (_bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("menu").key("show_menu"), &scope())
            .await
            .unwrap();

        let outcome = dispatcher
            .dispatch(
                &Response::edit("x").key("other").handler("show_menu"),
                &scope(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::FallbackSent(_)));
        assert_eq!(dispatcher.registry().len(CHAT), 2);
    }

    #[tokio::test]
    async fn test_metadata_follows_the_message() {
        let (_bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("profile").key("p").meta("user_id", 123), &scope())
            .await
            .unwrap();
        dispatcher
            .dispatch(&Response::edit("profile v2").key("p"), &scope())
            .await
            .unwrap();

        let entry = dispatcher.registry().entry(CHAT, "p").unwrap();
        assert_eq!(entry.metadata["user_id"], 123);

        dispatcher
            .dispatch(&Response::edit("profile v2").key("p").meta("user_id", 456), &scope())
            .await
            .unwrap();
        let entry = dispatcher.registry().entry(CHAT, "p").unwrap();
        assert_eq!(entry.metadata["user_id"], 456);
    }

    #[tokio::test]
    async fn test_delete_for_named_handler() {
        let (bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("menu").key("show_menu"), &scope())
            .await
            .unwrap();

        let outcome = dispatcher
            .dispatch(&Response::delete().handler("show_menu"), &scope())
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Deleted(_)));
        assert_eq!(bot.deletes(), 1);
        assert_eq!(dispatcher.registry().lookup(CHAT, "show_menu"), None);
    }

    #[tokio::test]
    async fn test_rich_content_is_recorded() {
        let (bot, dispatcher) = setup();
        dispatcher
            .dispatch(
                &Response::send(Content::quiz("2 + 2?", ["3", "4"], 1)).key("quiz"),
                &scope(),
            )
            .await
            .unwrap();
        let outcome = dispatcher
            .dispatch(
                &Response::edit(Content::quiz("2 + 2?", ["3", "4"], 1)).key("quiz"),
                &scope(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Unchanged(_)));
        assert_eq!(bot.edits(), 0);
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let (bot, dispatcher) = setup();
        let outcome = dispatcher
            .dispatch(&Response::delete().key("k"), &scope())
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert!(bot.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_not_found_drops_entry() {
        let (bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("v1").key("k"), &scope())
            .await
            .unwrap();
        bot.script_delete(Ok(DeleteOutcome::NotFound));

        let outcome = dispatcher
            .dispatch(&Response::delete().key("k"), &scope())
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Stale);
        assert_eq!(dispatcher.registry().lookup(CHAT, "k"), None);
    }

    #[tokio::test]
    async fn test_transport_error_leaves_registry() {
        let (bot, dispatcher) = setup();
        dispatcher
            .dispatch(&Response::send("v1").key("k"), &scope())
            .await
            .unwrap();
        let id = dispatcher.registry().lookup(CHAT, "k");
        bot.script_edit(Err(ApiError::Timeout));

        let err = dispatcher
            .dispatch(&Response::edit("v2").key("k"), &scope())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Transport { action: "edit", .. }));
        assert_eq!(dispatcher.registry().lookup(CHAT, "k"), id);
    }

    #[tokio::test]
    async fn test_send_edit_delete_sequence() {
        let (bot, dispatcher) = setup();
        for response in [
            Response::send("one").key("a"),
            Response::edit("two").key("a"),
            Response::delete().key("a"),
        ] {
            dispatcher.dispatch(&response, &scope()).await.unwrap();
        }

        let kinds: Vec<_> = bot.calls().iter().map(BotCall::kind).collect();
        assert_eq!(kinds, ["send", "edit", "delete"]);
        assert_eq!(dispatcher.registry().lookup(CHAT, "a"), None);
    }
}
