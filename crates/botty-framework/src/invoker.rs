//! Handler invocation.
//!
//! [`Invoker::invoke`] runs one matched update from start to finish:
//!
//! 1. resolve the handler's dependency graph; on failure the handler is
//!    skipped and nothing is dispatched
//! 2. run the handler, dispatching each response it produces in order and
//!    resuming it only once the response has been dispatched
//! 3. release the resolution context: commit and close the storage session
//!    on success, close only on failure
//!
//! Responses dispatched before a handler fails are not rolled back.
//! A transport call runs on its own task, so cancelling an invocation
//! never aborts a call that is already in flight.

use std::sync::Arc;

use botty_core::BoxedStorageProvider;
use tracing::{Instrument, debug, info_span, warn};

use crate::di::{ResolutionContext, Resolver};
use crate::dispatcher::{DispatchOutcome, DispatchScope, ResponseDispatcher};
use crate::error::{DispatchError, InvocationError};
use crate::reply::{Outgoing, Reply};
use crate::request::{BotHandle, Request};
use crate::router::HandlerDescriptor;

/// Summary of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationReport {
    pub handler: String,
    /// Outcomes of the responses that were dispatched, in order.
    pub dispatched: Vec<DispatchOutcome>,
    /// Responses whose transport call failed.
    pub failed: usize,
}

/// Drives handlers.
#[derive(Clone)]
pub struct Invoker {
    resolver: Resolver,
    dispatcher: ResponseDispatcher,
    storage: Option<BoxedStorageProvider>,
}

impl Invoker {
    pub fn new(
        resolver: Resolver,
        dispatcher: ResponseDispatcher,
        storage: Option<BoxedStorageProvider>,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            storage,
        }
    }

    pub fn dispatcher(&self) -> &ResponseDispatcher {
        &self.dispatcher
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Handles one matched request.
    pub async fn invoke(
        &self,
        descriptor: &HandlerDescriptor,
        request: Request,
    ) -> Result<InvocationReport, InvocationError> {
        let span = info_span!(
            "invoke",
            handler = %descriptor.name(),
            conversation = %request.conversation,
            request_id = %request.id,
        );
        self.invoke_inner(descriptor, request).instrument(span).await
    }

    async fn invoke_inner(
        &self,
        descriptor: &HandlerDescriptor,
        request: Request,
    ) -> Result<InvocationReport, InvocationError> {
        let handler = descriptor.name().to_string();
        let scope = DispatchScope {
            conversation: request.conversation,
            implicit_key: descriptor.message_key(),
        };
        let (reply, mut outbox) = Reply::channel();
        let ctx = ResolutionContext::new(
            request,
            BotHandle::new(Arc::clone(self.dispatcher.bot())),
            reply,
            self.storage.clone(),
        );

        let args = match self.resolver.resolve(descriptor.nodes(), &ctx).await {
            Ok(args) => args,
            Err(source) => {
                let _ = ctx.release(false).await;
                return Err(InvocationError::Skipped { handler, source });
            }
        };

        let mut report = InvocationReport {
            handler,
            ..Default::default()
        };
        let mut routine = descriptor.handler().call(args);
        let result = loop {
            tokio::select! {
                biased;
                Some(outgoing) = outbox.recv() => self.forward(outgoing, &scope, &mut report).await,
                result = &mut routine => break result,
            }
        };

        // Responses queued by reply handles the handler passed elsewhere.
        while let Ok(outgoing) = outbox.try_recv() {
            self.forward(outgoing, &scope, &mut report).await;
        }
        outbox.close();

        match result {
            Ok(()) => match ctx.release(true).await {
                Ok(()) => {
                    debug!(dispatched = report.dispatched.len(), "Handler finished");
                    Ok(report)
                }
                Err(source) => Err(InvocationError::Commit {
                    handler: report.handler,
                    dispatched: report.dispatched.len(),
                    source,
                }),
            },
            Err(source) => {
                let _ = ctx.release(false).await;
                Err(InvocationError::Execution {
                    handler: report.handler,
                    dispatched: report.dispatched.len(),
                    source,
                })
            }
        }
    }

    async fn forward(&self, outgoing: Outgoing, scope: &DispatchScope, report: &mut InvocationReport) {
        let Outgoing { response, ack } = outgoing;
        let dispatcher = self.dispatcher.clone();
        let task_scope = scope.clone();
        let task = tokio::spawn(
            async move { dispatcher.dispatch(&response, &task_scope).await }.in_current_span(),
        );

        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(DispatchError::Task(e.to_string())),
        };
        match &result {
            Ok(outcome) => report.dispatched.push(*outcome),
            Err(e) => {
                report.failed += 1;
                warn!(error = %e, "Failed to dispatch response");
            }
        }
        // The handler may have stopped waiting for the outcome.
        let _ = ack.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{Container, Inject};
    use crate::error::ResolutionError;
    use crate::registry::MessageRegistry;
    use crate::router::{RouteTable, Router};
    use crate::testing::{MemoryStorage, RecordingBot, updates};
    use botty_core::{BoxedBotClient, MessageId, Session, Update, User};
    use std::time::Duration;

    fn invoker(bot: &Arc<RecordingBot>, storage: Option<Arc<MemoryStorage>>) -> Invoker {
        let dispatcher = ResponseDispatcher::new(
            Arc::new(MessageRegistry::default()),
            bot.clone() as BoxedBotClient,
        );
        Invoker::new(
            Resolver::default(),
            dispatcher,
            storage.map(|s| s as BoxedStorageProvider),
        )
    }

    fn request(update: Update) -> Request {
        let conversation = update.conversation_id().unwrap();
        Request::new(Arc::new(update), conversation)
    }

    fn single(table: &RouteTable) -> &HandlerDescriptor {
        &table.descriptors()[0]
    }

    async fn lifecycle(reply: Reply) -> anyhow::Result<()> {
        reply.text("one").await?;
        reply.edit("two").await?;
        reply.delete("h").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_responses_dispatched_in_order() {
        let bot = Arc::new(RecordingBot::new());
        let table = Router::new()
            .command("go", lifecycle)
            .name("h")
            .compile(&Container::new())
            .unwrap();

        let report = invoker(&bot, None)
            .invoke(single(&table), request(updates::command(7, "go", "")))
            .await
            .unwrap();

        let kinds: Vec<_> = bot.calls().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, ["send", "edit", "delete"]);
        assert_eq!(
            report.dispatched,
            [
                DispatchOutcome::Sent(MessageId(1)),
                DispatchOutcome::Edited(MessageId(1)),
                DispatchOutcome::Deleted(MessageId(1)),
            ]
        );
        assert_eq!(report.failed, 0);
    }

    async fn greet(user: User, reply: Reply) -> anyhow::Result<()> {
        reply.text(format!("hi {}", user.first_name)).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_context_skips_handler() {
        let bot = Arc::new(RecordingBot::new());
        let table = Router::new().text(greet).compile(&Container::new()).unwrap();

        let err = invoker(&bot, None)
            .invoke(single(&table), request(updates::anonymous(3, "hello")))
            .await
            .unwrap_err();

        assert!(err.is_skipped());
        assert!(matches!(
            err,
            InvocationError::Skipped {
                source: ResolutionError::MissingContext { parameter: "User" },
                ..
            }
        ));
        assert!(bot.calls().is_empty());
    }

    async fn send_then_fail(_session: Session, reply: Reply) -> anyhow::Result<()> {
        reply.text("partial").await?;
        anyhow::bail!("lost the plot")
    }

    #[tokio::test]
    async fn test_failure_keeps_dispatched_responses() {
        let bot = Arc::new(RecordingBot::new());
        let storage = Arc::new(MemoryStorage::new());
        let mut container = Container::new();
        container.enable_storage();
        let table = Router::new().text(send_then_fail).compile(&container).unwrap();

        let err = invoker(&bot, Some(Arc::clone(&storage)))
            .invoke(single(&table), request(updates::text(1, "x")))
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::Execution { dispatched: 1, .. }));
        assert_eq!(bot.sends(), 1);
        assert_eq!(storage.opened(), 1);
        assert_eq!(storage.committed(), 0);
        assert_eq!(storage.closed(), 1);
    }

    async fn touch_session(_session: Session) {}

    #[tokio::test]
    async fn test_commit_failure() {
        let bot = Arc::new(RecordingBot::new());
        let storage = Arc::new(MemoryStorage::failing_commit());
        let mut container = Container::new();
        container.enable_storage();
        let table = Router::new().text(touch_session).compile(&container).unwrap();

        let err = invoker(&bot, Some(Arc::clone(&storage)))
            .invoke(single(&table), request(updates::text(1, "x")))
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::Commit { dispatched: 0, .. }));
        assert_eq!(storage.closed(), 1);
    }

    #[tokio::test]
    async fn test_successful_invocation_commits() {
        let bot = Arc::new(RecordingBot::new());
        let storage = Arc::new(MemoryStorage::new());
        let mut container = Container::new();
        container.enable_storage();
        let table = Router::new().text(touch_session).compile(&container).unwrap();

        invoker(&bot, Some(Arc::clone(&storage)))
            .invoke(single(&table), request(updates::text(1, "x")))
            .await
            .unwrap();

        assert_eq!(storage.committed(), 1);
        assert_eq!(storage.closed(), 1);
    }

    struct SendCounter(Arc<RecordingBot>);

    impl SendCounter {
        fn sends(&self) -> usize {
            self.0.sends()
        }
    }

    async fn paced(counter: Inject<SendCounter>, reply: Reply) -> anyhow::Result<()> {
        for expected in 1..=3 {
            reply.text(format!("step {expected}")).await?;
            anyhow::ensure!(counter.sends() == expected, "handler ran ahead of dispatch");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_handler_waits_for_each_dispatch() {
        let bot = Arc::new(RecordingBot::new().with_latency(Duration::from_millis(20)));
        let mut container = Container::new();
        container.instance(SendCounter(Arc::clone(&bot)));
        let table = Router::new().text(paced).compile(&container).unwrap();

        let report = invoker(&bot, None)
            .invoke(single(&table), request(updates::text(1, "x")))
            .await
            .unwrap();
        assert_eq!(report.dispatched.len(), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_reaches_handler() {
        let bot = Arc::new(RecordingBot::new());
        bot.script_send(Err(botty_core::ApiError::Timeout));
        let table = Router::new()
            .command("go", lifecycle)
            .name("h")
            .compile(&Container::new())
            .unwrap();

        let err = invoker(&bot, None)
            .invoke(single(&table), request(updates::command(7, "go", "")))
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::Execution { dispatched: 0, .. }));
        assert_eq!(bot.calls().len(), 1);
    }
}
