//! Per-conversation memory of sent messages.
//!
//! The registry maps `(conversation, key)` to the transport id of the last
//! message sent under that key, so a later response can edit or delete it.
//! Each conversation has its own lock; unrelated conversations never
//! contend. Entries live in memory only and are lost on restart.
//!
//! Each conversation keeps at most `capacity` entries. When a new key would
//! exceed it, the least recently updated entry is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use botty_core::{ConversationId, MessageId, MessageKey, Metadata};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Default number of entries kept per conversation.
pub const DEFAULT_CAPACITY: usize = 100;

/// What the registry knows about one sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRegistryEntry {
    pub message_id: MessageId,
    /// Fingerprint of the last content sent or edited in.
    pub content_hash: Option<u64>,
    /// Data the handler attached when sending or editing.
    pub metadata: Metadata,
    pub updated_at: DateTime<Utc>,
}

impl MessageRegistryEntry {
    fn new(message_id: MessageId, content_hash: Option<u64>, metadata: Metadata) -> Self {
        Self {
            message_id,
            content_hash,
            metadata,
            updated_at: Utc::now(),
        }
    }

    /// Time since the entry was last written.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.updated_at
    }
}

#[derive(Default)]
struct ConversationLog {
    entries: HashMap<MessageKey, MessageRegistryEntry>,
    /// Keys from least to most recently updated.
    order: VecDeque<MessageKey>,
    /// Set once the log has been unlinked from the registry.
    detached: bool,
}

impl ConversationLog {
    fn bump(&mut self, key: &MessageKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }

    fn forget(&mut self, key: &str) -> Option<MessageRegistryEntry> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k.as_str() != key);
        Some(entry)
    }
}

/// Shared registry of sent messages.
pub struct MessageRegistry {
    capacity: usize,
    conversations: RwLock<HashMap<ConversationId, Arc<Mutex<ConversationLog>>>>,
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MessageRegistry {
    /// Creates a registry keeping at most `capacity` entries per conversation.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            conversations: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn log(&self, conversation: ConversationId) -> Option<Arc<Mutex<ConversationLog>>> {
        self.conversations.read().get(&conversation).cloned()
    }

    fn log_or_insert(&self, conversation: ConversationId) -> Arc<Mutex<ConversationLog>> {
        if let Some(log) = self.log(conversation) {
            return log;
        }
        Arc::clone(self.conversations.write().entry(conversation).or_default())
    }

    /// Transport id remembered under `key`.
    pub fn lookup(&self, conversation: ConversationId, key: &str) -> Option<MessageId> {
        self.entry(conversation, key).map(|e| e.message_id)
    }

    /// Full entry remembered under `key`.
    pub fn entry(&self, conversation: ConversationId, key: &str) -> Option<MessageRegistryEntry> {
        self.log(conversation)?.lock().entries.get(key).cloned()
    }

    /// Remembers `message_id` under `key`, replacing any previous entry.
    pub fn record(
        &self,
        conversation: ConversationId,
        key: MessageKey,
        message_id: MessageId,
        content_hash: Option<u64>,
    ) {
        self.record_with(conversation, key, message_id, content_hash, Metadata::new());
    }

    /// Like [`record`](Self::record), storing `metadata` with the entry.
    pub fn record_with(
        &self,
        conversation: ConversationId,
        key: MessageKey,
        message_id: MessageId,
        content_hash: Option<u64>,
        metadata: Metadata,
    ) {
        loop {
            let slot = self.log_or_insert(conversation);
            let mut log = slot.lock();
            // Pruned between lookup and lock; fetch the fresh slot.
            if log.detached {
                continue;
            }

            if !log.entries.contains_key(&key) && log.entries.len() >= self.capacity {
                if let Some(oldest) = log.order.pop_front() {
                    log.entries.remove(&oldest);
                    debug!(%conversation, key = %oldest, "Evicted oldest registry entry");
                }
            }

            log.bump(&key);
            log.entries
                .insert(key, MessageRegistryEntry::new(message_id, content_hash, metadata));
            return;
        }
    }

    /// Refreshes the timestamp of an entry. Returns `false` if it is absent.
    pub fn touch(&self, conversation: ConversationId, key: &str) -> bool {
        let Some(log) = self.log(conversation) else {
            return false;
        };
        let mut log = log.lock();
        let Some(entry) = log.entries.get_mut(key) else {
            return false;
        };
        entry.updated_at = Utc::now();
        let key = MessageKey::from(key);
        log.bump(&key);
        true
    }

    /// Forgets `key`.
    pub fn remove(&self, conversation: ConversationId, key: &str) -> Option<MessageRegistryEntry> {
        let slot = self.log(conversation)?;
        let entry = slot.lock().forget(key);
        self.prune(conversation, &slot);
        entry
    }

    /// Forgets `key` only if it still points at `message_id`.
    ///
    /// Used after a transport call so that a newer message recorded under
    /// the same key by a concurrent update is kept.
    pub fn remove_if(
        &self,
        conversation: ConversationId,
        key: &str,
        message_id: MessageId,
    ) -> bool {
        let Some(log) = self.log(conversation) else {
            return false;
        };
        let removed = {
            let mut log = log.lock();
            if log.entries.get(key).map(|e| e.message_id) != Some(message_id) {
                return false;
            }
            log.forget(key).is_some()
        };
        self.prune(conversation, &log);
        removed
    }

    /// Drops the conversation's slot if its log is empty.
    fn prune(&self, conversation: ConversationId, slot: &Arc<Mutex<ConversationLog>>) {
        if !slot.lock().entries.is_empty() {
            return;
        }
        let mut conversations = self.conversations.write();
        let Some(current) = conversations.get(&conversation) else {
            return;
        };
        if !Arc::ptr_eq(current, slot) {
            return;
        }
        let mut log = current.lock();
        if log.entries.is_empty() {
            log.detached = true;
            drop(log);
            conversations.remove(&conversation);
        }
    }

    /// Number of conversations holding at least one entry.
    pub fn conversations(&self) -> usize {
        self.conversations.read().len()
    }

    /// Forgets every entry of a conversation.
    pub fn clear(&self, conversation: ConversationId) {
        let removed = self.conversations.write().remove(&conversation);
        if let Some(slot) = removed {
            slot.lock().detached = true;
            debug!(%conversation, "Cleared message registry");
        }
    }

    /// The most recently updated entry of a conversation.
    pub fn last(&self, conversation: ConversationId) -> Option<(MessageKey, MessageRegistryEntry)> {
        let log = self.log(conversation)?;
        let log = log.lock();
        let key = log.order.back()?;
        Some((key.clone(), log.entries.get(key)?.clone()))
    }

    /// All entries of a conversation, most recently updated first.
    pub fn entries(&self, conversation: ConversationId) -> Vec<(MessageKey, MessageRegistryEntry)> {
        let Some(log) = self.log(conversation) else {
            return Vec::new();
        };
        let log = log.lock();
        log.order
            .iter()
            .rev()
            .filter_map(|k| Some((k.clone(), log.entries.get(k)?.clone())))
            .collect()
    }

    /// Number of entries kept for a conversation.
    pub fn len(&self, conversation: ConversationId) -> usize {
        self.log(conversation).map_or(0, |log| log.lock().entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: ConversationId = ConversationId(1);

    #[test]
    fn test_record_lookup_remove() {
        let registry = MessageRegistry::default();
        assert_eq!(registry.lookup(CHAT, "a"), None);

        registry.record(CHAT, "a".into(), MessageId(10), Some(1));
        assert_eq!(registry.lookup(CHAT, "a"), Some(MessageId(10)));
        assert_eq!(registry.lookup(ConversationId(2), "a"), None);

        registry.record(CHAT, "a".into(), MessageId(11), None);
        assert_eq!(registry.lookup(CHAT, "a"), Some(MessageId(11)));
        assert_eq!(registry.len(CHAT), 1);

        assert!(registry.remove(CHAT, "a").is_some());
        assert_eq!(registry.lookup(CHAT, "a"), None);
    }

    #[test]
    fn test_empty_conversations_are_dropped() {
        let registry = MessageRegistry::default();
        for chat in 0..1000 {
            registry.record(ConversationId(chat), "a".into(), MessageId(chat), None);
            registry.remove(ConversationId(chat), "a");
        }
        assert_eq!(registry.conversations(), 0);

        registry.record(CHAT, "a".into(), MessageId(1), None);
        registry.record(CHAT, "b".into(), MessageId(2), None);
        assert!(registry.remove_if(CHAT, "a", MessageId(1)));
        assert_eq!(registry.conversations(), 1);
        assert!(registry.remove_if(CHAT, "b", MessageId(2)));
        assert_eq!(registry.conversations(), 0);

        registry.record(CHAT, "c".into(), MessageId(3), None);
        assert_eq!(registry.lookup(CHAT, "c"), Some(MessageId(3)));
        assert_eq!(registry.conversations(), 1);
    }

    #[test]
    fn test_remove_if_keeps_newer_entry() {
        let registry = MessageRegistry::default();
        registry.record(CHAT, "a".into(), MessageId(2), None);

        assert!(!registry.remove_if(CHAT, "a", MessageId(1)));
        assert_eq!(registry.lookup(CHAT, "a"), Some(MessageId(2)));
        assert!(registry.remove_if(CHAT, "a", MessageId(2)));
        assert_eq!(registry.len(CHAT), 0);
    }

    #[test]
    fn test_evicts_least_recently_updated() {
        let registry = MessageRegistry::new(2);
        registry.record(CHAT, "a".into(), MessageId(1), None);
        registry.record(CHAT, "b".into(), MessageId(2), None);
        assert!(registry.touch(CHAT, "a"));

        registry.record(CHAT, "c".into(), MessageId(3), None);

        assert_eq!(registry.len(CHAT), 2);
        assert_eq!(registry.lookup(CHAT, "b"), None);
        assert_eq!(registry.lookup(CHAT, "a"), Some(MessageId(1)));
        assert_eq!(registry.lookup(CHAT, "c"), Some(MessageId(3)));
    }

    #[test]
    fn test_last_and_entries_order() {
        let registry = MessageRegistry::default();
        registry.record(CHAT, "a".into(), MessageId(1), None);
        registry.record(CHAT, "b".into(), MessageId(2), None);
        registry.record(CHAT, "a".into(), MessageId(3), None);

        let (key, entry) = registry.last(CHAT).unwrap();
        assert_eq!(key.as_str(), "a");
        assert_eq!(entry.message_id, MessageId(3));

        let keys: Vec<_> = registry
            .entries(CHAT)
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn test_clear_conversation() {
        let registry = MessageRegistry::default();
        registry.record(CHAT, "a".into(), MessageId(1), None);
        registry.record(ConversationId(2), "a".into(), MessageId(2), None);

        registry.clear(CHAT);

        assert_eq!(registry.len(CHAT), 0);
        assert!(registry.last(CHAT).is_none());
        assert_eq!(registry.lookup(ConversationId(2), "a"), Some(MessageId(2)));
    }

    #[test]
    fn test_metadata_is_kept_with_entry() {
        let registry = MessageRegistry::default();
        let mut metadata = Metadata::new();
        metadata.insert("user_id".into(), 123.into());
        registry.record_with(CHAT, "profile".into(), MessageId(5), None, metadata.clone());

        let entry = registry.entry(CHAT, "profile").unwrap();
        assert_eq!(entry.metadata, metadata);

        registry.record(CHAT, "profile".into(), MessageId(6), None);
        assert!(registry.entry(CHAT, "profile").unwrap().metadata.is_empty());
    }

    #[test]
    fn test_touch_missing() {
        let registry = MessageRegistry::default();
        assert!(!registry.touch(CHAT, "nope"));
    }
}
