//! Routing.
//!
//! A [`Router`] collects routes; [`Router::compile`] validates each handler
//! and builds its dependency graph, producing an immutable [`RouteTable`].
//! Any invalid handler fails compilation, so problems surface at startup
//! rather than when a user first triggers the route.
//!
//! ```rust,ignore
//! let routes = Router::new()
//!     .command("start", start)
//!     .callback(r"todo:(?P<id>\d+)", toggle_todo)
//!     .prefix("!", &["help", "info"], help)
//!     .message(MessageFilter::contains("thanks"), welcome)
//!     .text(echo)
//!     .compile(&container)?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use botty_core::{IncomingMessage, MessageKey, Update};
use regex::Regex;
use tracing::{info, warn};

use crate::di::{Container, DependencyNode, GraphBuilder};
use crate::error::{RegistrationError, RegistrationResult};
use crate::handler::{BoxedHandler, Handler, RoutineKind, into_handler};
use crate::request::{Captures, CommandArgs};

// =============================================================================
// MessageFilter
// =============================================================================

/// Predicate over incoming messages, composable with `and`, `or` and `not`.
#[derive(Clone)]
pub struct MessageFilter {
    name: Arc<str>,
    predicate: Arc<dyn Fn(&IncomingMessage) -> bool + Send + Sync>,
}

impl MessageFilter {
    /// A filter named `name` for logs, accepting what `predicate` accepts.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&IncomingMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            predicate: Arc::new(predicate),
        }
    }

    /// Every message, commands included.
    pub fn all() -> Self {
        Self::new("all", |_| true)
    }

    /// Messages carrying text, commands included.
    pub fn has_text() -> Self {
        Self::new("has_text", |m| m.text.is_some())
    }

    /// Command messages.
    pub fn command() -> Self {
        Self::new("command", |m| m.command().is_some())
    }

    /// Messages whose text contains `needle`, ignoring case.
    pub fn contains(needle: &str) -> Self {
        let needle = needle.to_lowercase();
        Self::new(format!("contains({needle:?})"), move |m| {
            m.text
                .as_deref()
                .is_some_and(|text| text.to_lowercase().contains(&needle))
        })
    }

    /// Messages whose text matches `regex` anywhere.
    pub fn regex(regex: Regex) -> Self {
        Self::new(format!("regex({})", regex.as_str()), move |m| {
            m.text.as_deref().is_some_and(|text| regex.is_match(text))
        })
    }

    pub fn and(self, other: Self) -> Self {
        Self::new(format!("({} & {})", self.name, other.name), move |m| {
            self.accepts(m) && other.accepts(m)
        })
    }

    pub fn or(self, other: Self) -> Self {
        Self::new(format!("({} | {})", self.name, other.name), move |m| {
            self.accepts(m) || other.accepts(m)
        })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::new(format!("!{}", self.name), move |m| !self.accepts(m))
    }

    pub fn accepts(&self, message: &IncomingMessage) -> bool {
        (self.predicate)(message)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageFilter").field(&self.name).finish()
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// Which updates a handler accepts.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Messages starting with `/name`, for any of the names.
    Command(Vec<String>),
    /// Callback queries whose data matches the pattern from its start.
    Callback(Regex),
    /// Text messages that are not commands.
    Text,
    /// Text whose first word is the prefix followed by one of the names,
    /// compared without case.
    Prefix { prefix: String, names: Vec<String> },
    /// Messages the filter accepts.
    Message(MessageFilter),
}

impl Matcher {
    fn matches(&self, update: &Update) -> Option<(Captures, CommandArgs)> {
        match self {
            Self::Command(names) => {
                let (name, args) = update.command()?;
                names
                    .iter()
                    .any(|n| n == name)
                    .then(|| (Captures::default(), CommandArgs(args.to_string())))
            }
            Self::Callback(regex) => {
                let data = update.callback_data()?;
                let caps = regex.captures(data)?;
                Some((Captures::from_regex(regex, &caps), CommandArgs::default()))
            }
            Self::Text => {
                if update.command().is_some() {
                    return None;
                }
                update.text()?;
                Some((Captures::default(), CommandArgs::default()))
            }
            Self::Prefix { prefix, names } => {
                let text = update.text()?.trim_start();
                let (head, args) = match text.split_once(char::is_whitespace) {
                    Some((head, rest)) => (head, rest.trim()),
                    None => (text, ""),
                };
                let name = head.strip_prefix(prefix.as_str())?;
                names
                    .iter()
                    .any(|n| n.eq_ignore_ascii_case(name))
                    .then(|| (Captures::default(), CommandArgs(args.to_string())))
            }
            Self::Message(filter) => {
                let message = update.message.as_ref()?;
                let args = message
                    .command()
                    .map(|(_, args)| CommandArgs(args.to_string()))
                    .unwrap_or_default();
                filter
                    .accepts(message)
                    .then(|| (Captures::default(), args))
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Callback(_) => "callback",
            Self::Text => "text",
            Self::Prefix { .. } => "prefix",
            Self::Message(_) => "message",
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(names) => write!(f, "/{}", names.join(" | /")),
            Self::Callback(regex) => write!(f, "callback {}", regex.as_str()),
            Self::Text => f.write_str("text"),
            Self::Prefix { prefix, names } => {
                let names: Vec<_> = names.iter().map(|n| format!("{prefix}{n}")).collect();
                f.write_str(&names.join(" | "))
            }
            Self::Message(filter) => write!(f, "message {}", filter.name()),
        }
    }
}

// =============================================================================
// HandlerDescriptor
// =============================================================================

/// A compiled route: matcher, handler and its dependency graph.
pub struct HandlerDescriptor {
    name: String,
    matcher: Matcher,
    handler: BoxedHandler,
    nodes: Vec<Arc<DependencyNode>>,
}

impl HandlerDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// One node per handler parameter, in declaration order.
    pub fn nodes(&self) -> &[Arc<DependencyNode>] {
        &self.nodes
    }

    /// Key used for responses that name none.
    pub fn message_key(&self) -> MessageKey {
        MessageKey::new(self.name.as_str())
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("matcher", &self.matcher)
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Router
// =============================================================================

enum Pattern {
    Commands(Vec<String>),
    Callback(String),
    Text,
    Prefix { prefix: String, names: Vec<String> },
    Message(MessageFilter),
}

struct Route {
    pattern: Pattern,
    handler: BoxedHandler,
    name: Option<String>,
}

/// Builder for a set of routes.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    fn push<H, T>(mut self, pattern: Pattern, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.routes.push(Route {
            pattern,
            handler: into_handler(handler),
            name: None,
        });
        self
    }

    /// Routes `/name` commands.
    pub fn command<H, T>(self, name: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.commands(&[name], handler)
    }

    /// Routes several command names to one handler.
    pub fn commands<H, T>(self, names: &[&str], handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        let names = names
            .iter()
            .map(|n| n.trim_start_matches('/').to_string())
            .collect();
        self.push(Pattern::Commands(names), handler)
    }

    /// Routes callback queries whose data matches `pattern` from its start.
    ///
    /// Groups in the pattern are available to the handler as [`Captures`].
    pub fn callback<H, T>(self, pattern: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.push(Pattern::Callback(pattern.to_string()), handler)
    }

    /// Routes plain text messages.
    pub fn text<H, T>(self, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.push(Pattern::Text, handler)
    }

    /// Routes messages whose first word is `prefix` plus one of `names`,
    /// such as `!help`. Names are compared without case; the rest of the
    /// text is available as [`CommandArgs`].
    pub fn prefix<H, T>(self, prefix: &str, names: &[&str], handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        let pattern = Pattern::Prefix {
            prefix: prefix.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
        };
        self.push(pattern, handler)
    }

    /// Routes any message the filter accepts, commands included.
    pub fn message<H, T>(self, filter: MessageFilter, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.push(Pattern::Message(filter), handler)
    }

    /// Names the most recently added route.
    ///
    /// The name is used in logs, errors and as the implicit message key.
    /// Defaults to the handler's Rust path.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        if let Some(route) = self.routes.last_mut() {
            route.name = Some(name.into());
        }
        self
    }

    /// Appends all routes of `other`.
    pub fn merge(mut self, other: Router) -> Self {
        self.routes.extend(other.routes);
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Validates every route and builds its dependency graph.
    pub fn compile(self, container: &Container) -> RegistrationResult<RouteTable> {
        let mut graph = GraphBuilder::new(container);
        let mut seen_commands = HashSet::new();
        let mut descriptors = Vec::with_capacity(self.routes.len());

        for route in self.routes {
            let name = route
                .name
                .unwrap_or_else(|| route.handler.type_name().to_string());

            let signature = route.handler.signature();
            if signature.routine != RoutineKind::Suspending {
                return Err(RegistrationError::HandlerSignature {
                    handler: name,
                    expected: RoutineKind::Suspending,
                    actual: signature.routine,
                    suggestion: "Declare the handler as `async fn` and produce responses \
                                 through a `Reply` parameter."
                        .to_string(),
                });
            }

            let matcher = match route.pattern {
                Pattern::Commands(names) => {
                    for command in &names {
                        if !seen_commands.insert(command.clone()) {
                            warn!(command = %command, handler = %name, "Command already routed, the first route wins");
                        }
                    }
                    Matcher::Command(names)
                }
                Pattern::Callback(pattern) => {
                    let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|source| {
                        RegistrationError::InvalidPattern {
                            handler: name.clone(),
                            pattern: pattern.clone(),
                            source,
                        }
                    })?;
                    Matcher::Callback(regex)
                }
                Pattern::Text => Matcher::Text,
                Pattern::Prefix { prefix, names } => {
                    if prefix.is_empty() || names.is_empty() || names.iter().any(|n| n.is_empty()) {
                        return Err(RegistrationError::InvalidPrefix {
                            handler: name,
                            route: format!("{prefix}{}", names.join("|")),
                        });
                    }
                    Matcher::Prefix { prefix, names }
                }
                Pattern::Message(filter) => Matcher::Message(filter),
            };

            let nodes = graph.build(&name, &signature.params)?;
            info!(
                handler = %name,
                kind = matcher.kind(),
                route = %matcher,
                params = nodes.len(),
                "Registered handler"
            );
            descriptors.push(Arc::new(HandlerDescriptor {
                name,
                matcher,
                handler: route.handler,
                nodes,
            }));
        }

        Ok(RouteTable { descriptors })
    }
}

// =============================================================================
// RouteTable
// =============================================================================

/// An update matched to a handler.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub descriptor: Arc<HandlerDescriptor>,
    pub captures: Captures,
    pub args: CommandArgs,
}

/// Compiled, immutable routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    descriptors: Vec<Arc<HandlerDescriptor>>,
}

impl RouteTable {
    /// First route, in registration order, that accepts the update.
    pub fn matches(&self, update: &Update) -> Option<RouteMatch> {
        self.descriptors.iter().find_map(|descriptor| {
            let (captures, args) = descriptor.matcher.matches(update)?;
            Some(RouteMatch {
                descriptor: Arc::clone(descriptor),
                captures,
                args,
            })
        })
    }

    pub fn descriptors(&self) -> &[Arc<HandlerDescriptor>] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
