//! Dependency identity, resolution strategy and scope.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable identity of an injectable type.
///
/// Two keys are equal when they name the same Rust type; the type name is
/// carried only for error messages and logs.
#[derive(Clone, Copy)]
pub struct DependencyKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl DependencyKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without module paths, e.g. `Inject<TodoRepo>` instead of
    /// `botty_framework::di::Inject<app::TodoRepo>`.
    pub fn short_name(&self) -> String {
        let mut out = String::with_capacity(self.type_name.len());
        let mut segment = String::new();
        for c in self.type_name.chars() {
            match c {
                ':' => segment.clear(),
                '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' => {
                    out.push_str(&segment);
                    segment.clear();
                    out.push(c);
                }
                _ => segment.push(c),
            }
        }
        out.push_str(&segment);
        out
    }
}

impl PartialEq for DependencyKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for DependencyKey {}

impl Hash for DependencyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// How a dependency is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Read from the current update or its resolution context.
    DirectContext,
    /// Built from the update's storage session.
    Repository,
    /// Built once by a factory and shared for the process lifetime.
    Service,
    /// Built by a registered factory with a declared scope.
    Factory,
}

/// Lifetime of a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// One instance for the process.
    Singleton,
    /// One instance per update.
    #[default]
    PerRequest,
    /// A fresh instance on every use.
    Uncached,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Singleton => "singleton",
            Self::PerRequest => "per-request",
            Self::Uncached => "uncached",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod app {
        pub struct TodoRepo;
    }

    #[test]
    fn test_short_name_strips_paths() {
        let key = DependencyKey::of::<crate::di::Inject<app::TodoRepo>>();
        assert_eq!(key.short_name(), "Inject<TodoRepo>");
        assert_eq!(DependencyKey::of::<u64>().short_name(), "u64");
    }

    #[test]
    fn test_equality_ignores_name() {
        assert_eq!(DependencyKey::of::<String>(), DependencyKey::of::<String>());
        assert_ne!(DependencyKey::of::<String>(), DependencyKey::of::<u8>());
    }
}
