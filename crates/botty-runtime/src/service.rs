//! Tower integration.
//!
//! [`AppService`] exposes an [`Application`] as a `tower::Service<Update>`
//! so that tower middleware (rate limits, load shedding, extra timeouts)
//! can wrap update handling.
//!
//! ```rust,ignore
//! use tower::{ServiceBuilder, ServiceExt};
//! use tower::limit::ConcurrencyLimitLayer;
//!
//! let svc = ServiceBuilder::new()
//!     .layer(ConcurrencyLimitLayer::new(64))
//!     .service(app.service());
//! let outcome = svc.oneshot(update).await?;
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use botty_core::Update;
use tower::util::BoxCloneService;
use tower::{BoxError, Service, ServiceExt};

use crate::app::{Application, HandleOutcome};

/// An [`Application`] as a service. Applies no timeout of its own.
#[derive(Clone)]
pub struct AppService {
    app: Application,
}

impl AppService {
    pub fn new(app: Application) -> Self {
        Self { app }
    }
}

impl Service<Update> for AppService {
    type Response = HandleOutcome;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, update: Update) -> Self::Future {
        let app = self.app.clone();
        Box::pin(async move { Ok(app.process(update, None).await) })
    }
}

impl Application {
    /// This application as a service, wrapped in a `tower` timeout when
    /// `runtime.handler_timeout_secs` is set.
    ///
    /// A timed out call fails with [`tower::timeout::error::Elapsed`].
    pub fn service(&self) -> BoxCloneService<Update, HandleOutcome, BoxError> {
        let svc = AppService::new(self.clone());
        match self.config().runtime.handler_timeout() {
            Some(limit) => BoxCloneService::new(tower::timeout::Timeout::new(svc, limit)),
            None => BoxCloneService::new(svc.map_err(BoxError::from)),
        }
    }
}
