//! Per-update values handlers can receive directly.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use botty_core::{BotClient, BoxedBotClient, ConversationId, Update};
use uuid::Uuid;

/// Groups captured by a callback-data pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    positional: Vec<Option<String>>,
    named: HashMap<String, String>,
}

impl Captures {
    pub(crate) fn from_regex(regex: &regex::Regex, caps: &regex::Captures<'_>) -> Self {
        let positional = caps
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        let named = regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Self { positional, named }
    }

    /// Value of a named group.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Value of the `index`-th group, starting at 1 like the pattern syntax.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.positional.get(index.checked_sub(1)?)?.as_deref()
    }

    /// Parses a named group.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name)?.parse().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }
}

/// Text following a command name, e.g. `buy milk` for `/add buy milk`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs(pub String);

impl CommandArgs {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whitespace-separated words.
    pub fn split(&self) -> impl Iterator<Item = &str> {
        self.0.split_whitespace()
    }
}

impl Deref for CommandArgs {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// The transport client, for calls the response vocabulary does not cover.
///
/// Calls made through the handle bypass the message registry.
#[derive(Clone)]
pub struct BotHandle(BoxedBotClient);

impl BotHandle {
    pub fn new(client: BoxedBotClient) -> Self {
        Self(client)
    }

    pub fn client(&self) -> &BoxedBotClient {
        &self.0
    }
}

impl Deref for BotHandle {
    type Target = dyn BotClient;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for BotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BotHandle").finish_non_exhaustive()
    }
}

/// Correlation id of one handled update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An update matched to a route, ready to be handled.
#[derive(Debug, Clone)]
pub struct Request {
    pub update: Arc<Update>,
    pub conversation: ConversationId,
    pub captures: Captures,
    pub args: CommandArgs,
    pub id: RequestId,
}

impl Request {
    pub fn new(update: Arc<Update>, conversation: ConversationId) -> Self {
        Self {
            update,
            conversation,
            captures: Captures::default(),
            args: CommandArgs::default(),
            id: RequestId::new(),
        }
    }

    pub fn with_captures(mut self, captures: Captures) -> Self {
        self.captures = captures;
        self
    }

    pub fn with_args(mut self, args: CommandArgs) -> Self {
        self.args = args;
        self
    }
}
