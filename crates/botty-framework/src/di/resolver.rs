//! Per-update dependency resolution.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::trace;

use super::container::Constructor;
use super::context::ResolutionContext;
use super::graph::DependencyNode;
use super::inject::Resolved;
use super::key::Scope;
use super::scope::SingletonCache;
use crate::error::{ResolutionError, ResolutionResult};

/// Evaluates dependency graphs.
///
/// Nodes are evaluated post-order: a node's dependencies are resolved
/// before the node is constructed. Values are cached according to scope,
/// singletons in the shared [`SingletonCache`] and per-request values in
/// the [`ResolutionContext`].
#[derive(Clone, Default)]
pub struct Resolver {
    singletons: Arc<SingletonCache>,
}

impl Resolver {
    pub fn new(singletons: Arc<SingletonCache>) -> Self {
        Self { singletons }
    }

    pub fn singletons(&self) -> &Arc<SingletonCache> {
        &self.singletons
    }

    /// Resolves a handler's parameters, preserving their order.
    ///
    /// Stops at the first failure; nothing partially resolved is returned.
    pub async fn resolve(
        &self,
        nodes: &[Arc<DependencyNode>],
        ctx: &ResolutionContext,
    ) -> ResolutionResult<Vec<Resolved>> {
        let mut values = Vec::with_capacity(nodes.len());
        for node in nodes {
            values.push(self.resolve_node(node, ctx).await?);
        }
        Ok(values)
    }

    fn resolve_node<'a>(
        &'a self,
        node: &'a DependencyNode,
        ctx: &'a ResolutionContext,
    ) -> BoxFuture<'a, ResolutionResult<Resolved>> {
        Box::pin(async move {
            match node.scope {
                Scope::Singleton => {
                    self.singletons
                        .get_or_try_init(node.key, || self.construct(node, ctx))
                        .await
                }
                Scope::PerRequest => {
                    if let Some(value) = ctx.cached(&node.key) {
                        return Ok(value);
                    }
                    let value = self.construct(node, ctx).await?;
                    ctx.store(node.key, Arc::clone(&value));
                    Ok(value)
                }
                Scope::Uncached => self.construct(node, ctx).await,
            }
        })
    }

    async fn construct(
        &self,
        node: &DependencyNode,
        ctx: &ResolutionContext,
    ) -> ResolutionResult<Resolved> {
        match &node.constructor {
            Constructor::Context(slot) => ctx.context_value(*slot).await,
            Constructor::Build { build, close } => {
                let mut args = Vec::with_capacity(node.dependencies.len());
                for dependency in &node.dependencies {
                    args.push(self.resolve_node(dependency, ctx).await?);
                }

                trace!(dependency = %node.key, scope = %node.scope, "Constructing dependency");
                let value = build(args)
                    .await
                    .map_err(|source| ResolutionError::Failure {
                        dependency: node.key.type_name(),
                        source,
                    })?;

                if let Some(close) = close
                    && node.scope != Scope::Singleton
                {
                    ctx.on_release(Arc::clone(close), Arc::clone(&value));
                }
                Ok(value)
            }
        }
    }
}
