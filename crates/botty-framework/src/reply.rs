//! The handler side of the response channel.
//!
//! A handler produces responses by awaiting [`Reply::send`]. The call does
//! not return until the response has been dispatched, so a handler never
//! runs ahead of its own output and at most one response is in flight per
//! invocation.

use std::fmt;

use botty_core::{Content, MessageKey, Response};
use tokio::sync::{mpsc, oneshot};

use crate::dispatcher::DispatchOutcome;
use crate::error::DispatchError;

pub(crate) struct Outgoing {
    pub(crate) response: Response,
    pub(crate) ack: oneshot::Sender<Result<DispatchOutcome, DispatchError>>,
}

/// Receiving end drained by the invoker.
pub(crate) type Outbox = mpsc::Receiver<Outgoing>;

/// Sends responses for the current update.
#[derive(Clone)]
pub struct Reply {
    tx: mpsc::Sender<Outgoing>,
}

impl Reply {
    pub(crate) fn channel() -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Dispatches one response and waits for the outcome.
    ///
    /// A transport failure is returned here and does not end the handler;
    /// propagate it with `?` to abort.
    pub async fn send(&self, response: Response) -> Result<DispatchOutcome, DispatchError> {
        let (ack, outcome) = oneshot::channel();
        self.tx
            .send(Outgoing { response, ack })
            .await
            .map_err(|_| DispatchError::Closed)?;
        outcome.await.map_err(|_| DispatchError::Closed)?
    }

    /// Sends a new message under the handler's implicit key.
    pub async fn text(&self, content: impl Into<Content>) -> Result<DispatchOutcome, DispatchError> {
        self.send(Response::send(content)).await
    }

    /// Edits the message under the handler's implicit key.
    pub async fn edit(&self, content: impl Into<Content>) -> Result<DispatchOutcome, DispatchError> {
        self.send(Response::edit(content)).await
    }

    /// Deletes the message remembered under `key`.
    pub async fn delete(&self, key: impl Into<MessageKey>) -> Result<DispatchOutcome, DispatchError> {
        self.send(Response::delete().key(key)).await
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botty_core::MessageId;

    #[tokio::test]
    async fn test_send_waits_for_ack() {
        let (reply, mut outbox) = Reply::channel();

        let drain = tokio::spawn(async move {
            let outgoing = outbox.recv().await.unwrap();
            assert_eq!(outgoing.response.kind(), "send");
            outgoing.ack.send(Ok(DispatchOutcome::Sent(MessageId(5)))).unwrap();
        });

        let outcome = reply.text("hello").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent(MessageId(5)));
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_outbox() {
        let (reply, outbox) = Reply::channel();
        drop(outbox);
        assert!(matches!(reply.text("x").await, Err(DispatchError::Closed)));
    }

    #[tokio::test]
    async fn test_dropped_ack() {
        let (reply, mut outbox) = Reply::channel();
        tokio::spawn(async move {
            drop(outbox.recv().await);
        });
        assert!(matches!(reply.edit("x").await, Err(DispatchError::Closed)));
    }
}
