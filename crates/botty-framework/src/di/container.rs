//! Capability registration.
//!
//! The [`Container`] is the explicit declaration step that ties a type to a
//! resolution [`Strategy`] and [`Scope`]. Route compilation consults it to
//! build dependency graphs; nothing is looked up by reflection at runtime.
//!
//! ```rust,ignore
//! let mut container = Container::new();
//! container
//!     .service(|| async { Ok(Clock::system()) })
//!     .repository::<TodoRepo>()
//!     .factory(|user: User, repo: Inject<TodoRepo>| async move {
//!         Ok(CurrentList::load(&repo, user.id).await?)
//!     });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use botty_core::{CallbackQuery, Chat, IncomingMessage, Session, Update, User};
use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::inject::{Injectable, Resolved};
use super::key::{DependencyKey, Scope, Strategy};
use crate::reply::Reply;
use crate::request::{BotHandle, Captures, CommandArgs, RequestId};

// =============================================================================
// Provider
// =============================================================================

pub(crate) type BuildFn =
    Arc<dyn Fn(Vec<Resolved>) -> BoxFuture<'static, anyhow::Result<Resolved>> + Send + Sync>;

pub(crate) type CloseFn = Arc<dyn Fn(&Resolved) + Send + Sync>;

/// Context objects read straight from the update being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextSlot {
    Update,
    User,
    Chat,
    Message,
    CallbackQuery,
    Session,
    Bot,
    Captures,
    CommandArgs,
    RequestId,
    Reply,
}

#[derive(Clone)]
pub(crate) enum Constructor {
    Context(ContextSlot),
    Build {
        build: BuildFn,
        close: Option<CloseFn>,
    },
}

/// How one registered type is produced.
#[derive(Clone)]
pub struct Provider {
    strategy: Strategy,
    scope: Scope,
    dependencies: Vec<DependencyKey>,
    pub(crate) constructor: Constructor,
}

impl Provider {
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Keys of the constructor's parameters, in order.
    pub fn dependencies(&self) -> &[DependencyKey] {
        &self.dependencies
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("strategy", &self.strategy)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Contracts for registered types
// =============================================================================

/// A type built from the update's storage session.
pub trait Repository: Send + Sync + Sized + 'static {
    fn from_session(session: Session) -> Self;
}

/// A resource that must be released when its update is done.
pub trait Closeable: Send + Sync + 'static {
    fn close(&self);
}

/// An async function that builds a dependency from injected parameters.
///
/// Implemented for `Fn(T1, .., Tn) -> impl Future<Output = anyhow::Result<O>>`
/// with up to 12 [`Injectable`] parameters.
pub trait Factory<Args>: Clone + Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// Keys of the parameters, in declaration order.
    fn dependencies() -> Vec<DependencyKey>;

    /// Calls the factory with resolved parameters.
    fn construct(&self, args: Vec<Resolved>) -> BoxFuture<'static, anyhow::Result<Self::Output>>;
}

impl<F, Fut, O> Factory<()> for F
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    O: Send + Sync + 'static,
{
    type Output = O;

    fn dependencies() -> Vec<DependencyKey> {
        Vec::new()
    }

    fn construct(&self, _args: Vec<Resolved>) -> BoxFuture<'static, anyhow::Result<O>> {
        Box::pin((self)())
    }
}

macro_rules! impl_factory {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case)]
        impl<F, Fut, O, $($ty,)*> Factory<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
            O: Send + Sync + 'static,
            $( $ty: Injectable, )*
        {
            type Output = O;

            fn dependencies() -> Vec<DependencyKey> {
                vec![$($ty::key(),)*]
            }

            fn construct(&self, args: Vec<Resolved>) -> BoxFuture<'static, anyhow::Result<O>> {
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
                    f($($ty,)*).await
                })
            }
        }
    };
}

impl_factory!(T1);
impl_factory!(T1, T2);
impl_factory!(T1, T2, T3);
impl_factory!(T1, T2, T3, T4);
impl_factory!(T1, T2, T3, T4, T5);
impl_factory!(T1, T2, T3, T4, T5, T6);
impl_factory!(T1, T2, T3, T4, T5, T6, T7);
impl_factory!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_factory!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_factory!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_factory!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_factory!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);

fn build_fn<F, Args>(factory: F) -> BuildFn
where
    F: Factory<Args>,
{
    Arc::new(move |args| {
        let fut = factory.construct(args);
        Box::pin(async move {
            let value: Resolved = Arc::new(fut.await?);
            Ok(value)
        })
    })
}

fn close_fn<T: Closeable>() -> CloseFn {
    Arc::new(|value: &Resolved| {
        if let Some(resource) = value.downcast_ref::<T>() {
            resource.close();
        }
    })
}

// =============================================================================
// Container
// =============================================================================

/// Registered capabilities, keyed by type.
#[derive(Clone)]
pub struct Container {
    providers: HashMap<DependencyKey, Provider>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Creates a container holding every built-in context object except
    /// [`Session`], which needs a storage provider.
    pub fn new() -> Self {
        let mut container = Self {
            providers: HashMap::new(),
        };
        container.context::<Update>(ContextSlot::Update);
        container.context::<User>(ContextSlot::User);
        container.context::<Chat>(ContextSlot::Chat);
        container.context::<IncomingMessage>(ContextSlot::Message);
        container.context::<CallbackQuery>(ContextSlot::CallbackQuery);
        container.context::<BotHandle>(ContextSlot::Bot);
        container.context::<Captures>(ContextSlot::Captures);
        container.context::<CommandArgs>(ContextSlot::CommandArgs);
        container.context::<RequestId>(ContextSlot::RequestId);
        container.context::<Reply>(ContextSlot::Reply);
        container
    }

    fn context<T: 'static>(&mut self, slot: ContextSlot) {
        self.providers.insert(
            DependencyKey::of::<T>(),
            Provider {
                strategy: Strategy::DirectContext,
                scope: Scope::PerRequest,
                dependencies: Vec::new(),
                constructor: Constructor::Context(slot),
            },
        );
    }

    fn insert(&mut self, key: DependencyKey, provider: Provider) {
        debug!(
            dependency = %key,
            strategy = ?provider.strategy,
            scope = %provider.scope,
            "Registered dependency"
        );
        if let Some(previous) = self.providers.insert(key, provider) {
            warn!(
                dependency = %key,
                previous = ?previous.strategy,
                "Dependency registered twice, the last registration wins"
            );
        }
    }

    /// Makes the storage [`Session`] injectable.
    ///
    /// Called by the application when a storage provider is configured.
    pub fn enable_storage(&mut self) -> &mut Self {
        self.context::<Session>(ContextSlot::Session);
        self
    }

    /// Returns `true` if [`Session`] is injectable.
    pub fn has_storage(&self) -> bool {
        self.providers.contains_key(&DependencyKey::of::<Session>())
    }

    /// Registers a repository, built per update from the storage session.
    pub fn repository<R: Repository>(&mut self) -> &mut Self {
        let build: BuildFn = Arc::new(|args: Vec<Resolved>| {
            Box::pin(async move {
                let session = args
                    .first()
                    .and_then(Session::from_resolved)
                    .ok_or_else(|| anyhow!("storage session has an unexpected type"))?;
                let repository: Resolved = Arc::new(R::from_session(session));
                Ok(repository)
            })
        });
        self.insert(
            DependencyKey::of::<R>(),
            Provider {
                strategy: Strategy::Repository,
                scope: Scope::PerRequest,
                dependencies: vec![DependencyKey::of::<Session>()],
                constructor: Constructor::Build { build, close: None },
            },
        );
        self
    }

    /// Registers a service, built once on first use and shared afterwards.
    pub fn service<F, Args>(&mut self, factory: F) -> &mut Self
    where
        F: Factory<Args>,
    {
        self.insert(
            DependencyKey::of::<F::Output>(),
            Provider {
                strategy: Strategy::Service,
                scope: Scope::Singleton,
                dependencies: F::dependencies(),
                constructor: Constructor::Build {
                    build: build_fn(factory),
                    close: None,
                },
            },
        );
        self
    }

    /// Registers an already built service.
    pub fn instance<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        let value: Resolved = Arc::new(value);
        let build: BuildFn = Arc::new(move |_| {
            let value = Arc::clone(&value);
            Box::pin(async move { Ok(value) })
        });
        self.insert(
            DependencyKey::of::<T>(),
            Provider {
                strategy: Strategy::Service,
                scope: Scope::Singleton,
                dependencies: Vec::new(),
                constructor: Constructor::Build { build, close: None },
            },
        );
        self
    }

    /// Registers a per-update factory.
    pub fn factory<F, Args>(&mut self, factory: F) -> &mut Self
    where
        F: Factory<Args>,
    {
        self.factory_scoped(factory, Scope::PerRequest)
    }

    /// Registers a factory with an explicit scope.
    pub fn factory_scoped<F, Args>(&mut self, factory: F, scope: Scope) -> &mut Self
    where
        F: Factory<Args>,
    {
        self.insert(
            DependencyKey::of::<F::Output>(),
            Provider {
                strategy: Strategy::Factory,
                scope,
                dependencies: F::dependencies(),
                constructor: Constructor::Build {
                    build: build_fn(factory),
                    close: None,
                },
            },
        );
        self
    }

    /// Registers a factory whose outputs are closed when their update is done.
    ///
    /// Singleton outputs live for the process and are never closed.
    pub fn closeable_factory<F, Args>(&mut self, factory: F, scope: Scope) -> &mut Self
    where
        F: Factory<Args>,
        F::Output: Closeable,
    {
        self.insert(
            DependencyKey::of::<F::Output>(),
            Provider {
                strategy: Strategy::Factory,
                scope,
                dependencies: F::dependencies(),
                constructor: Constructor::Build {
                    build: build_fn(factory),
                    close: Some(close_fn::<F::Output>()),
                },
            },
        );
        self
    }

    pub fn provider(&self, key: &DependencyKey) -> Option<&Provider> {
        self.providers.get(key)
    }

    /// Returns `true` if `T` can be injected.
    pub fn contains<T: 'static>(&self) -> bool {
        self.providers.contains_key(&DependencyKey::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::Inject;

    struct Clock;
    struct Repo(Session);

    impl Repository for Repo {
        fn from_session(session: Session) -> Self {
            Self(session)
        }
    }

    #[test]
    fn test_builtin_context_objects() {
        let container = Container::new();
        assert!(container.contains::<Update>());
        assert!(container.contains::<Reply>());
        assert!(!container.has_storage());

        let provider = container.provider(&DependencyKey::of::<User>()).unwrap();
        assert_eq!(provider.strategy(), Strategy::DirectContext);
        assert_eq!(provider.scope(), Scope::PerRequest);
    }

    #[test]
    fn test_strategies_and_scopes() {
        let mut container = Container::new();
        container
            .enable_storage()
            .service(|| async { anyhow::Ok(Clock) })
            .repository::<Repo>()
            .factory_scoped(
                |_clock: Inject<Clock>, args: CommandArgs| async move { anyhow::Ok(args.0.len()) },
                Scope::Uncached,
            );

        let clock = container.provider(&DependencyKey::of::<Clock>()).unwrap();
        assert_eq!(clock.strategy(), Strategy::Service);
        assert_eq!(clock.scope(), Scope::Singleton);

        let repo = container.provider(&DependencyKey::of::<Repo>()).unwrap();
        assert_eq!(repo.strategy(), Strategy::Repository);
        assert_eq!(repo.dependencies(), &[DependencyKey::of::<Session>()]);

        let len = container.provider(&DependencyKey::of::<usize>()).unwrap();
        assert_eq!(len.strategy(), Strategy::Factory);
        assert_eq!(len.scope(), Scope::Uncached);
        assert_eq!(
            len.dependencies(),
            &[DependencyKey::of::<Clock>(), DependencyKey::of::<CommandArgs>()]
        );
    }

    #[test]
    fn test_last_registration_wins() {
        let mut container = Container::new();
        container.service(|| async { anyhow::Ok(1u8) });
        container.factory(|| async { anyhow::Ok(2u8) });
        let provider = container.provider(&DependencyKey::of::<u8>()).unwrap();
        assert_eq!(provider.strategy(), Strategy::Factory);
    }

    #[tokio::test]
    async fn test_instance_is_shared() {
        let mut container = Container::new();
        container.instance(String::from("config"));
        let provider = container.provider(&DependencyKey::of::<String>()).unwrap();
        let Constructor::Build { build, .. } = &provider.constructor else {
            panic!("instance must be built");
        };
        let a = build(Vec::new()).await.unwrap();
        let b = build(Vec::new()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
