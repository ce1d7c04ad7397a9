//! Types that can appear as handler or factory parameters.
//!
//! Every parameter implements [`Injectable`]: it names the [`DependencyKey`]
//! it needs and knows how to take itself out of the resolved value.
//! Registered services, repositories and factory outputs are received as
//! [`Inject<T>`]; context objects such as [`Update`] are received by value.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use botty_core::{CallbackQuery, Chat, IncomingMessage, Session, Update, User};

use super::key::DependencyKey;
use crate::reply::Reply;
use crate::request::{BotHandle, Captures, CommandArgs, RequestId};

/// A resolved dependency, type-erased.
pub type Resolved = Arc<dyn Any + Send + Sync>;

/// A value a handler or factory can declare as a parameter.
pub trait Injectable: Send + Sized + 'static {
    /// Identity of the dependency this parameter needs.
    fn key() -> DependencyKey;

    /// Takes the parameter out of its resolved value.
    ///
    /// Returns `None` if the value has an unexpected type.
    fn from_resolved(value: &Resolved) -> Option<Self>;
}

/// Shared handle to a registered dependency.
///
/// ```rust,ignore
/// async fn list(repo: Inject<TodoRepo>, reply: Reply) -> anyhow::Result<()> {
///     let items = repo.all().await?;
///     // ...
/// }
/// ```
pub struct Inject<T>(pub Arc<T>);

impl<T> Inject<T> {
    /// The shared instance.
    pub fn arc(&self) -> &Arc<T> {
        &self.0
    }

    /// Returns `true` if both handles point to the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Inject<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Inject").field(&self.0).finish()
    }
}

impl<T: Send + Sync + 'static> Injectable for Inject<T> {
    fn key() -> DependencyKey {
        DependencyKey::of::<T>()
    }

    fn from_resolved(value: &Resolved) -> Option<Self> {
        Arc::clone(value).downcast::<T>().ok().map(Inject)
    }
}

/// Context objects are stored as `Arc<T>` and handed out as clones.
macro_rules! impl_injectable_by_clone {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Injectable for $ty {
                fn key() -> DependencyKey {
                    DependencyKey::of::<$ty>()
                }

                fn from_resolved(value: &Resolved) -> Option<Self> {
                    value.downcast_ref::<$ty>().cloned()
                }
            }
        )*
    };
}

impl_injectable_by_clone!(
    Update,
    User,
    Chat,
    IncomingMessage,
    CallbackQuery,
    Session,
    BotHandle,
    Captures,
    CommandArgs,
    RequestId,
    Reply,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_shares_instance() {
        let value: Resolved = Arc::new(String::from("shared"));
        let a = Inject::<String>::from_resolved(&value).unwrap();
        let b = Inject::<String>::from_resolved(&value).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(&*a, "shared");
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let value: Resolved = Arc::new(1u32);
        assert!(Inject::<String>::from_resolved(&value).is_none());
        assert!(CommandArgs::from_resolved(&value).is_none());
    }

    #[test]
    fn test_context_object_is_cloned() {
        let value: Resolved = Arc::new(CommandArgs("a b".into()));
        assert_eq!(CommandArgs::from_resolved(&value).unwrap().as_str(), "a b");
    }
}
