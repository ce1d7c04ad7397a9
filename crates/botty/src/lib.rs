//! # botty
//!
//! Async chat-bot handlers with injected dependencies and tracked replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐    ┌────────┐    ┌──────────┐    ┌─────────┐    ┌────────────┐
//! │ Update     │───▶│ Router │───▶│ Resolver │───▶│ Handler │───▶│ Dispatcher │──▶ BotClient
//! │ (transport)│    │        │    │ (DI)     │    │ (Reply) │    │ + Registry │
//! └────────────┘    └────────┘    └──────────┘    └─────────┘    └────────────┘
//! ```
//!
//! - **Router**: matches commands, callback data and text to handlers
//! - **Container / Resolver**: builds each handler's parameters from
//!   context objects, repositories, services and factories
//! - **Reply**: lets a handler send, edit and delete messages by key
//! - **Registry**: remembers which message each key refers to, per conversation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use botty::prelude::*;
//!
//! async fn start(user: User, reply: Reply) -> anyhow::Result<()> {
//!     reply.text(format!("Hello, {}!", user.first_name)).await?;
//!     Ok(())
//! }
//!
//! async fn toggle(captures: Captures, todos: Inject<TodoRepo>, reply: Reply) -> anyhow::Result<()> {
//!     let id: i64 = captures.parse("id").unwrap_or_default();
//!     todos.toggle(id).await?;
//!     reply.edit(todos.render().await?).await?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = AppBuilder::new()
//!         .config(load_config()?)
//!         .with_logging()
//!         .bot(client)
//!         .storage(database)
//!         .container(|c| {
//!             c.repository::<TodoRepo>();
//!         })
//!         .router(
//!             Router::new()
//!                 .command("start", start)
//!                 .callback(r"todo:(?P<id>\d+)", toggle),
//!         )
//!         .build()?;
//!
//!     let (tx, rx) = app.channel();
//!     tokio::spawn(poll_updates(tx));
//!     app.run_until_ctrl_c(rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `testing`: in-memory `RecordingBot` and `MemoryStorage`

pub use botty_core as core;
pub use botty_framework as framework;
pub use botty_runtime as runtime;

#[cfg(feature = "testing")]
pub use botty_framework::testing;

/// Commonly used types for building bots.
///
/// ```rust,ignore
/// use botty::prelude::*;
/// ```
pub mod prelude {
    // Application
    pub use botty_runtime::config::{BottyConfig, ConfigLoader, load_config};
    pub use botty_runtime::{AppBuilder, Application, HandleOutcome};

    // Registration
    pub use botty_framework::{Closeable, Container, MessageFilter, Repository, Router, Scope};

    // Handler parameters
    pub use botty_core::{CallbackQuery, Chat, IncomingMessage, Session, Update, User};
    pub use botty_framework::{BotHandle, Captures, CommandArgs, Inject, Reply, RequestId};

    // Responses
    pub use botty_core::{
        Content, DiceEmoji, InlineButton, InlineKeyboard, MessageKey, ParseMode, PollKind,
        Response, SendOptions,
    };
    pub use botty_framework::DispatchOutcome;

    // Ports
    pub use botty_core::{BotClient, StorageProvider, StorageSession};
}
