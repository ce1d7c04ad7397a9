//! Dependency graph construction.
//!
//! Each handler's parameter list is expanded once, when routes are compiled,
//! into a list of [`DependencyNode`] trees. Expansion follows each provider's
//! own dependencies recursively, rejects unknown types and cycles, and shares
//! identical subtrees between parameters and handlers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::container::{Constructor, Container};
use super::key::{DependencyKey, Scope, Strategy};
use crate::error::{RegistrationError, RegistrationResult};

/// One resolvable dependency with its own dependencies already expanded.
pub struct DependencyNode {
    pub key: DependencyKey,
    pub strategy: Strategy,
    pub scope: Scope,
    pub dependencies: Vec<Arc<DependencyNode>>,
    pub(crate) constructor: Constructor,
}

impl DependencyNode {
    /// Number of nodes in this subtree, counting shared nodes once per use.
    pub fn size(&self) -> usize {
        1 + self.dependencies.iter().map(|d| d.size()).sum::<usize>()
    }
}

impl std::fmt::Debug for DependencyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyNode")
            .field("key", &self.key)
            .field("strategy", &self.strategy)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Builds dependency graphs against one [`Container`].
pub struct GraphBuilder<'a> {
    container: &'a Container,
    memo: HashMap<DependencyKey, Arc<DependencyNode>>,
    path: Vec<DependencyKey>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self {
            container,
            memo: HashMap::new(),
            path: Vec::new(),
        }
    }

    /// Expands a handler's parameters, in order.
    pub fn build(
        &mut self,
        handler: &str,
        params: &[DependencyKey],
    ) -> RegistrationResult<Vec<Arc<DependencyNode>>> {
        params
            .iter()
            .enumerate()
            .map(|(index, key)| {
                self.path.clear();
                self.expand(*key).map_err(|failure| failure.into_error(handler, index + 1, *key))
            })
            .collect()
    }

    fn expand(&mut self, key: DependencyKey) -> Result<Arc<DependencyNode>, Failure> {
        if let Some(node) = self.memo.get(&key) {
            return Ok(Arc::clone(node));
        }

        if let Some(start) = self.path.iter().position(|k| *k == key) {
            let cycle = self.path[start..]
                .iter()
                .chain(std::iter::once(&key))
                .map(|k| k.short_name())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(Failure::Cycle(cycle));
        }

        let Some(provider) = self.container.provider(&key) else {
            return Err(Failure::Missing {
                key,
                required_by: self.path.last().copied(),
            });
        };

        self.path.push(key);
        let mut dependencies = Vec::with_capacity(provider.dependencies().len());
        for dependency in provider.dependencies() {
            dependencies.push(self.expand(*dependency)?);
        }
        self.path.pop();

        if provider.scope() == Scope::Singleton {
            for dependency in &dependencies {
                if dependency.scope != Scope::Singleton {
                    warn!(
                        dependency = %key,
                        captured = %dependency.key,
                        scope = %dependency.scope,
                        "Singleton depends on a shorter-lived value; the first value is kept for the process lifetime"
                    );
                }
            }
        }

        let node = Arc::new(DependencyNode {
            key,
            strategy: provider.strategy(),
            scope: provider.scope(),
            dependencies,
            constructor: provider.constructor.clone(),
        });
        self.memo.insert(key, Arc::clone(&node));
        Ok(node)
    }
}

enum Failure {
    Missing {
        key: DependencyKey,
        required_by: Option<DependencyKey>,
    },
    Cycle(String),
}

impl Failure {
    fn into_error(self, handler: &str, parameter: usize, param: DependencyKey) -> RegistrationError {
        match self {
            Self::Cycle(cycle) => RegistrationError::CyclicDependency {
                handler: handler.to_string(),
                cycle,
            },
            Self::Missing { key, required_by } => {
                let what = if key == DependencyKey::of::<botty_core::Session>() {
                    "storage is not configured".to_string()
                } else {
                    format!("no provider registered for '{key}'")
                };
                let reason = match required_by {
                    Some(owner) => format!("{what} (required by '{owner}')"),
                    None => format!(
                        "{what}; register it on the container or use a built-in context type"
                    ),
                };
                RegistrationError::DependencyDeclaration {
                    handler: handler.to_string(),
                    parameter,
                    type_name: param.type_name(),
                    reason,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{Inject, Repository};
    use botty_core::{Session, Update, User};

    struct Config;
    struct Clock;
    struct Repo;

    impl Repository for Repo {
        fn from_session(_session: Session) -> Self {
            Self
        }
    }

    struct A;
    struct B;
    struct C;

    #[test]
    fn test_builds_one_node_per_parameter() {
        let mut container = Container::new();
        container
            .instance(Config)
            .service(|_config: Inject<Config>| async { anyhow::Ok(Clock) });

        let params = [
            DependencyKey::of::<Update>(),
            DependencyKey::of::<Clock>(),
            DependencyKey::of::<User>(),
        ];
        let nodes = GraphBuilder::new(&container).build("h", &params).unwrap();

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].strategy, Strategy::DirectContext);
        assert_eq!(nodes[1].strategy, Strategy::Service);
        assert_eq!(nodes[1].scope, Scope::Singleton);
        assert_eq!(nodes[1].dependencies.len(), 1);
        assert_eq!(nodes[1].dependencies[0].key, DependencyKey::of::<Config>());
    }

    #[test]
    fn test_shared_subtrees_are_built_once() {
        let mut container = Container::new();
        container
            .instance(Config)
            .factory(|_c: Inject<Config>| async { anyhow::Ok(A) })
            .factory(|_c: Inject<Config>, _a: Inject<A>| async { anyhow::Ok(B) });

        let params = [DependencyKey::of::<A>(), DependencyKey::of::<B>()];
        let nodes = GraphBuilder::new(&container).build("h", &params).unwrap();

        assert!(Arc::ptr_eq(&nodes[0], &nodes[1].dependencies[1]));
        assert!(Arc::ptr_eq(
            &nodes[0].dependencies[0],
            &nodes[1].dependencies[0]
        ));
    }

    #[test]
    fn test_unknown_parameter() {
        let container = Container::new();
        let params = [DependencyKey::of::<Update>(), DependencyKey::of::<Clock>()];
        let err = GraphBuilder::new(&container)
            .build("show_time", &params)
            .unwrap_err();

        match err {
            RegistrationError::DependencyDeclaration {
                handler, parameter, ..
            } => {
                assert_eq!(handler, "show_time");
                assert_eq!(parameter, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_repository_without_storage() {
        let mut container = Container::new();
        container.repository::<Repo>();
        let err = GraphBuilder::new(&container)
            .build("list", &[DependencyKey::of::<Repo>()])
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("storage is not configured"), "{message}");
        assert!(message.contains("required by 'Repo'"), "{message}");
    }

    #[test]
    fn test_self_referential_factory() {
        let mut container = Container::new();
        container.factory(|_a: Inject<A>| async { anyhow::Ok(A) });
        let err = GraphBuilder::new(&container)
            .build("h", &[DependencyKey::of::<A>()])
            .unwrap_err();

        match err {
            RegistrationError::CyclicDependency { cycle, .. } => assert_eq!(cycle, "A -> A"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mutual_cycle_names_full_path() {
        let mut container = Container::new();
        container
            .factory(|_b: Inject<B>| async { anyhow::Ok(A) })
            .service(|_c: Inject<C>| async { anyhow::Ok(B) })
            .factory(|_a: Inject<A>| async { anyhow::Ok(C) });
        let err = GraphBuilder::new(&container)
            .build("h", &[DependencyKey::of::<Update>(), DependencyKey::of::<B>()])
            .unwrap_err();

        match err {
            RegistrationError::CyclicDependency { handler, cycle } => {
                assert_eq!(handler, "h");
                assert_eq!(cycle, "B -> C -> A -> B");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
