//! # Botty Framework
//!
//! Dependency injection and response dispatch for chat bots.
//!
//! This layer provides:
//! - A [`Container`] of providers and compile-time validated dependency graphs
//! - Async handlers whose parameters are resolved per update
//! - A [`Reply`] handle through which handlers send, edit and delete messages
//! - A per-conversation [`MessageRegistry`] mapping message keys to ids
//!
//! The framework knows nothing about where updates come from; the runtime
//! feeds it updates and supplies the transport client.

pub mod di;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod invoker;
pub mod registry;
pub mod reply;
pub mod request;
pub mod router;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use di::{
    Closeable, Container, DependencyKey, Factory, Inject, Injectable, Repository, Resolver,
    Scope, Strategy,
};
pub use dispatcher::{DispatchOutcome, DispatchScope, ResponseDispatcher};
pub use error::{
    DispatchError, InvocationError, RegistrationError, RegistrationResult, ResolutionError,
    ResolutionResult,
};
pub use handler::{BoxedHandler, ErasedHandler, Handler, HandlerOutput, RoutineKind, into_handler};
pub use invoker::{InvocationReport, Invoker};
pub use registry::{MessageRegistry, MessageRegistryEntry};
pub use reply::Reply;
pub use request::{BotHandle, Captures, CommandArgs, Request, RequestId};
pub use router::{HandlerDescriptor, Matcher, MessageFilter, RouteMatch, RouteTable, Router};
