//! Handler system.
//!
//! A handler is an async function whose parameters are all [`Injectable`].
//! It produces responses through a [`Reply`](crate::Reply) parameter and
//! finishes with `()` or `anyhow::Result<()>`.
//!
//! ```rust,ignore
//! async fn countdown(reply: Reply) -> anyhow::Result<()> {
//!     reply.send(Response::send("3").key("cd")).await?;
//!     tokio::time::sleep(Duration::from_secs(1)).await;
//!     reply.send(Response::edit("2").key("cd")).await?;
//!     Ok(())
//! }
//! ```
//!
//! [`Handler`] is implemented for such functions with up to 12 parameters.
//! Its [`signature`](Handler::signature) exposes the parameter keys so the
//! dependency graph can be built when routes are compiled.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::BoxFuture;

use crate::di::{DependencyKey, Injectable, Resolved};

// ============================================================================
// Signature
// ============================================================================

/// Whether a routine can suspend between the responses it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    /// Returns a future; may await between responses.
    Suspending,
    /// Runs to completion on the calling thread.
    Blocking,
}

impl fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Suspending => "suspending (async)",
            Self::Blocking => "blocking (sync)",
        })
    }
}

/// Declared shape of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSignature {
    pub params: Vec<DependencyKey>,
    pub routine: RoutineKind,
}

// ============================================================================
// Handler output
// ============================================================================

/// Return types a handler may finish with.
pub trait HandlerOutput: Send + 'static {
    fn into_result(self) -> anyhow::Result<()>;
}

impl HandlerOutput for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> HandlerOutput for Result<(), E>
where
    E: Into<anyhow::Error> + Send + 'static,
{
    fn into_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// A routine that can be routed to.
///
/// Implement it by hand only for routines that cannot be plain async
/// functions; route compilation rejects any whose signature reports
/// [`RoutineKind::Blocking`].
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Parameter keys and routine kind.
    fn signature(&self) -> HandlerSignature;

    /// Runs the handler with resolved parameters, in declaration order.
    fn call(&self, args: Vec<Resolved>) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> Handler<()> for F
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerOutput,
{
    fn signature(&self) -> HandlerSignature {
        HandlerSignature {
            params: Vec::new(),
            routine: RoutineKind::Suspending,
        }
    }

    fn call(&self, _args: Vec<Resolved>) -> BoxFuture<'static, anyhow::Result<()>> {
        let fut = (self)();
        Box::pin(async move { fut.await.into_result() })
    }
}

/// Macro to generate Handler implementations for functions with different arities.
macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case)]
        impl<F, Fut, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future + Send + 'static,
            Fut::Output: HandlerOutput,
            $( $ty: Injectable, )*
        {
            fn signature(&self) -> HandlerSignature {
                HandlerSignature {
                    params: vec![$($ty::key(),)*],
                    routine: RoutineKind::Suspending,
                }
            }

            fn call(&self, args: Vec<Resolved>) -> BoxFuture<'static, anyhow::Result<()>> {
                let f = self.clone();
                Box::pin(async move {
                    let mut args = args.into_iter();
                    $(
                        let $ty = args
                            .next()
                            .as_ref()
                            .and_then($ty::from_resolved)
                            .ok_or_else(|| anyhow!("parameter '{}' has an unexpected type", $ty::key()))?;
                    )*
                    f($($ty,)*).await.into_result()
                })
            }
        }
    };
}

impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);

// ============================================================================
// Type erasure
// ============================================================================

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    fn signature(&self) -> HandlerSignature;

    fn call(&self, args: Vec<Resolved>) -> BoxFuture<'static, anyhow::Result<()>>;

    /// Rust type name of the underlying routine.
    fn type_name(&self) -> &'static str;
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Wraps a [`Handler`] so it can be stored as a [`BoxedHandler`].
pub struct HandlerFn<F, T> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> ErasedHandler for HandlerFn<F, T>
where
    F: Handler<T>,
    T: 'static,
{
    fn signature(&self) -> HandlerSignature {
        self.f.signature()
    }

    fn call(&self, args: Vec<Resolved>) -> BoxFuture<'static, anyhow::Result<()>> {
        self.f.call(args)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<F>()
    }
}

/// Convert a handler into a boxed handler.
pub fn into_handler<F, T>(f: F) -> BoxedHandler
where
    F: Handler<T>,
    T: 'static,
{
    Arc::new(HandlerFn {
        f,
        _marker: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::Reply;
    use botty_core::{Update, User};

    async fn no_params() {}

    async fn fallible(_update: Update, _user: User) -> anyhow::Result<()> {
        anyhow::bail!("nope")
    }

    async fn with_reply(_reply: Reply) -> Result<(), std::io::Error> {
        Ok(())
    }

    #[test]
    fn test_signature_lists_params_in_order() {
        let handler = into_handler(fallible);
        let signature = handler.signature();
        assert_eq!(
            signature.params,
            vec![DependencyKey::of::<Update>(), DependencyKey::of::<User>()]
        );
        assert_eq!(signature.routine, RoutineKind::Suspending);
        assert!(handler.type_name().ends_with("fallible"));

        assert!(into_handler(no_params).signature().params.is_empty());
        assert_eq!(into_handler(with_reply).signature().params.len(), 1);
    }

    #[tokio::test]
    async fn test_call_converts_output() {
        assert!(into_handler(no_params).call(Vec::new()).await.is_ok());

        let update: Resolved = Arc::new(Update::new(1));
        let user: Resolved = Arc::new(User {
            id: 1,
            first_name: "a".into(),
            username: None,
        });
        let err = into_handler(fallible)
            .call(vec![update, user])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[tokio::test]
    async fn test_mismatched_argument() {
        let wrong: Resolved = Arc::new(0u8);
        let err = into_handler(with_reply).call(vec![wrong]).await.unwrap_err();
        assert!(err.to_string().contains("unexpected type"));
    }
}
