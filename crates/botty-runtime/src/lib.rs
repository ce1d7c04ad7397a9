//! botty runtime - orchestration layer for the botty framework.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`)
//! - Logging initialization (`LoggingBuilder`)
//! - Application assembly with fail-fast route validation (`AppBuilder`)
//! - The concurrent update loop with graceful shutdown (`Application::run`)
//! - A `tower::Service<Update>` view of the application
//!
//! ```rust,ignore
//! use botty_runtime::{AppBuilder, config::load_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = AppBuilder::new()
//!         .config(load_config()?)
//!         .with_logging()
//!         .bot(client)
//!         .router(routes())
//!         .build()?;
//!
//!     let (tx, rx) = app.channel();
//!     tokio::spawn(poll_updates(tx));
//!     app.run_until_ctrl_c(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod service;

pub use app::{AppBuilder, Application, HandleOutcome};
pub use config::{BottyConfig, ConfigError, ConfigLoader, ConfigResult};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use service::AppService;

pub use tokio_util::sync::CancellationToken;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
