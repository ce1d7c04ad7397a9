//! Application assembly and the update loop.
//!
//! ```rust,ignore
//! let app = AppBuilder::new()
//!     .config(load_config()?)
//!     .bot(client)
//!     .storage(database)
//!     .container(|c| {
//!         c.repository::<TodoRepo>();
//!         c.service(|| async { anyhow::Ok(Clock::system()) });
//!     })
//!     .router(Router::new().command("start", start).callback(r"todo:(\d+)", toggle))
//!     .build()?;
//!
//! let (tx, rx) = app.channel();
//! tokio::spawn(poll_updates(tx));
//! app.run_until_ctrl_c(rx).await?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use botty_core::{BoxedBotClient, BoxedStorageProvider, ConversationId, Update};
use botty_framework::{
    Container, InvocationError, InvocationReport, Invoker, MessageRegistry, Request, Resolver,
    ResponseDispatcher, RouteTable, Router,
};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{BottyConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// How one update ended.
#[derive(Debug)]
pub enum HandleOutcome {
    /// No route accepted the update.
    NoMatch,
    /// The update belongs to no conversation.
    NoConversation,
    Completed(InvocationReport),
    /// Dependency resolution failed; the handler never ran.
    Skipped(InvocationError),
    /// The handler or the final commit failed.
    Failed(InvocationError),
    /// The handler exceeded the configured timeout and was cancelled.
    TimedOut { handler: String },
    /// The handler panicked. Responses dispatched before the panic stay sent.
    Panicked { handler: String, message: String },
}

impl HandleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

// =============================================================================
// AppBuilder
// =============================================================================

/// Assembles an [`Application`]; every route is validated in [`build`](Self::build).
pub struct AppBuilder {
    config: BottyConfig,
    bot: Option<BoxedBotClient>,
    storage: Option<BoxedStorageProvider>,
    container: Container,
    router: Router,
    init_logging: bool,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: BottyConfig::default(),
            bot: None,
            storage: None,
            container: Container::new(),
            router: Router::new(),
            init_logging: false,
        }
    }

    pub fn config(mut self, config: BottyConfig) -> Self {
        self.config = config;
        self
    }

    /// The transport client. Required.
    pub fn bot(mut self, bot: BoxedBotClient) -> Self {
        self.bot = Some(bot);
        self
    }

    /// Configures storage and makes `Session` injectable.
    pub fn storage(mut self, storage: BoxedStorageProvider) -> Self {
        self.storage = Some(storage);
        self.container.enable_storage();
        self
    }

    /// Registers repositories, services and factories.
    pub fn container(mut self, configure: impl FnOnce(&mut Container)) -> Self {
        configure(&mut self.container);
        self
    }

    /// Adds routes after those already added.
    pub fn router(mut self, router: Router) -> Self {
        self.router = self.router.merge(router);
        self
    }

    /// Installs the global tracing subscriber from the logging config on build.
    pub fn with_logging(mut self) -> Self {
        self.init_logging = true;
        self
    }

    pub fn build(self) -> RuntimeResult<Application> {
        validate_config(&self.config)?;
        if self.init_logging {
            logging::init_from_config(&self.config.logging);
        }

        let bot = self.bot.ok_or(RuntimeError::MissingBot)?;
        if self.container.has_storage() && self.storage.is_none() {
            return Err(RuntimeError::MissingStorage);
        }

        let routes = self.router.compile(&self.container).inspect_err(|e| {
            error!(error = %e, "Handler registration failed");
        })?;

        let registry = Arc::new(MessageRegistry::new(
            self.config.registry.max_messages_per_conversation,
        ));
        let invoker = Invoker::new(
            Resolver::default(),
            ResponseDispatcher::new(registry, bot),
            self.storage,
        );

        info!(
            routes = routes.len(),
            providers = self.container.len(),
            storage = self.container.has_storage(),
            timeout_secs = ?self.config.runtime.handler_timeout_secs,
            serialize_conversations = self.config.runtime.serialize_conversations,
            "Application built"
        );

        Ok(Application {
            inner: Arc::new(AppInner {
                routes,
                invoker,
                config: self.config,
                locks: parking_lot::Mutex::new(HashMap::new()),
            }),
        })
    }
}

// =============================================================================
// Application
// =============================================================================

type ConversationLock = Arc<tokio::sync::Mutex<()>>;

struct AppInner {
    routes: RouteTable,
    invoker: Invoker,
    config: BottyConfig,
    locks: parking_lot::Mutex<HashMap<ConversationId, ConversationLock>>,
}

/// A running bot: routes, providers and the message registry.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Application {
    inner: Arc<AppInner>,
}

impl Application {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn config(&self) -> &BottyConfig {
        &self.inner.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.inner.routes
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        self.inner.invoker.dispatcher().registry()
    }

    pub fn invoker(&self) -> &Invoker {
        &self.inner.invoker
    }

    /// A channel sized by `runtime.event_buffer`, for feeding [`run`](Self::run).
    pub fn channel(&self) -> (mpsc::Sender<Update>, mpsc::Receiver<Update>) {
        mpsc::channel(self.inner.config.runtime.event_buffer)
    }

    /// Handles one update to completion.
    ///
    /// Failures are logged and reported in the outcome; they never
    /// propagate.
    pub async fn handle(&self, update: Update) -> HandleOutcome {
        self.process(update, self.inner.config.runtime.handler_timeout())
            .await
    }

    /// Handles one update on its own task.
    pub fn spawn(&self, update: Update) -> JoinHandle<HandleOutcome> {
        let app = self.clone();
        tokio::spawn(async move { app.handle(update).await })
    }

    pub(crate) async fn process(&self, update: Update, timeout: Option<Duration>) -> HandleOutcome {
        let span = info_span!("handle_update", update_id = update.update_id);
        self.process_inner(update, timeout).instrument(span).await
    }

    async fn process_inner(&self, update: Update, timeout: Option<Duration>) -> HandleOutcome {
        let conversation = match update.conversation_id() {
            Ok(conversation) => conversation,
            Err(e) => {
                debug!(error = %e, "Ignoring update");
                return HandleOutcome::NoConversation;
            }
        };
        let Some(matched) = self.inner.routes.matches(&update) else {
            debug!(conversation = %conversation, "No route matched");
            return HandleOutcome::NoMatch;
        };

        let lock = self
            .inner
            .config
            .runtime
            .serialize_conversations
            .then(|| self.conversation_lock(conversation));
        let guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let descriptor = matched.descriptor;
        let request = Request::new(Arc::new(update), conversation)
            .with_captures(matched.captures)
            .with_args(matched.args);
        let invocation =
            AssertUnwindSafe(self.inner.invoker.invoke(&descriptor, request)).catch_unwind();

        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, invocation).await.ok(),
            None => Some(invocation.await),
        };

        drop(guard);
        if let Some(lock) = lock {
            self.release_lock(conversation, lock);
        }

        match result {
            Some(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                error!(
                    handler = %descriptor.name(),
                    conversation = %conversation,
                    panic = %message,
                    "Handler panicked"
                );
                HandleOutcome::Panicked {
                    handler: descriptor.name().to_string(),
                    message,
                }
            }
            Some(Ok(Ok(report))) => {
                info!(
                    handler = %report.handler,
                    conversation = %conversation,
                    dispatched = report.dispatched.len(),
                    failed = report.failed,
                    "Update handled"
                );
                HandleOutcome::Completed(report)
            }
            Some(Ok(Err(e))) if e.is_skipped() => {
                warn!(conversation = %conversation, error = %e, "Handler skipped");
                HandleOutcome::Skipped(e)
            }
            Some(Ok(Err(e))) => {
                error!(conversation = %conversation, error = %e, "Handler failed");
                HandleOutcome::Failed(e)
            }
            None => {
                warn!(
                    handler = %descriptor.name(),
                    conversation = %conversation,
                    timeout = ?timeout,
                    "Handler timed out"
                );
                HandleOutcome::TimedOut {
                    handler: descriptor.name().to_string(),
                }
            }
        }
    }

    fn conversation_lock(&self, conversation: ConversationId) -> ConversationLock {
        let mut locks = self.inner.locks.lock();
        Arc::clone(locks.entry(conversation).or_default())
    }

    /// Forgets the lock once no other task holds or awaits it.
    fn release_lock(&self, conversation: ConversationId, lock: ConversationLock) {
        let mut locks = self.inner.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&conversation);
        }
    }

    /// Handles updates concurrently until `shutdown` fires or the channel
    /// closes, then waits for updates still in flight.
    pub async fn run(
        &self,
        mut updates: mpsc::Receiver<Update>,
        shutdown: CancellationToken,
    ) -> RuntimeResult<()> {
        let mut tasks = JoinSet::new();
        info!("Application running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                update = updates.recv() => match update {
                    Some(update) => {
                        let app = self.clone();
                        tasks.spawn(async move { app.handle(update).await });
                    }
                    None => {
                        info!("Update stream closed");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::reap(joined);
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight updates");
        }
        while let Some(joined) = tasks.join_next().await {
            Self::reap(joined);
        }

        info!("Application stopped");
        Ok(())
    }

    fn reap(joined: Result<HandleOutcome, tokio::task::JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = %e, "Handler task panicked");
            } else {
                warn!(error = %e, "Handler task cancelled");
            }
        }
    }

    /// [`run`](Self::run) until Ctrl+C or SIGTERM.
    pub async fn run_until_ctrl_c(&self, updates: mpsc::Receiver<Update>) -> RuntimeResult<()> {
        let shutdown = CancellationToken::new();
        let run = self.run(updates, shutdown.clone());
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            signal = wait_for_shutdown() => {
                signal?;
                shutdown.cancel();
            }
        }
        run.await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}
