//! Dependency injection.
//!
//! Providers are registered on a [`Container`]; routes are compiled into
//! [`DependencyNode`] graphs by [`GraphBuilder`]; a [`Resolver`] walks those
//! graphs for each update inside a [`ResolutionContext`].

mod container;
mod context;
mod graph;
mod inject;
mod key;
mod resolver;
mod scope;

pub use container::{Closeable, Container, Factory, Provider, Repository};
pub use context::ResolutionContext;
pub use graph::{DependencyNode, GraphBuilder};
pub use inject::{Inject, Injectable, Resolved};
pub use key::{DependencyKey, Scope, Strategy};
pub use resolver::Resolver;
pub use scope::SingletonCache;
