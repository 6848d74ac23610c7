//! Request context lifecycle and the ambient current-context association.
//!
//! A [`RequestContext`] is the logical scope of one inbound request. It owns
//! the request's [`RequestCache`], begins with [`RequestContext::new`] and
//! ends with an explicit [`RequestContext::shutdown`].
//!
//! # The current-context association
//!
//! Cache-backed command executions implicitly target whatever context is
//! *current* for the executing task or thread. The association is a
//! single-slot, per-thread-of-control registry, and every installation is
//! scoped: [`RequestContext::scope`] and [`RequestContext::sync_scope`]
//! install the context for exactly the duration of the supplied work and then
//! restore the prior association, even on panic. There is no imperative
//! install, so a forgotten cleanup cannot leak a context onto an unrelated
//! request.
//!
//! Entering a scope on a thread of control that already has a current context
//! shadows that context for the duration of the scope only. Dispatching work
//! to another task or thread does **not** carry the association along; that
//! is what [`ContextCarrier`](crate::carrier::ContextCarrier) is for.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::cache::RequestCache;
use crate::errors::{ContextError, ContextResult};
use crate::types::ContextId;

tokio::task_local! {
    /// The single-slot current-context association for one task or thread.
    pub(crate) static CURRENT_CONTEXT: Option<RequestContext>;
}

/// The logical scope of one request, owning its cache.
///
/// `RequestContext` is a cheap cloneable handle: clones share the same
/// underlying context, and shutting down any clone shuts down the context for
/// all of them. Multiple contexts may be live concurrently (one per request),
/// each current on its own thread of control.
///
/// # Example
///
/// ```rust,ignore
/// let context = RequestContext::new();
/// context
///     .scope(async {
///         let mut command = CommandEnvelope::new(FetchUser::new(42));
///         let user = command.execute().await?;
///         // A second command with the same cache key is served from cache.
///         Ok::<_, CommandError>(user)
///     })
///     .await?;
/// context.shutdown()?;
/// ```
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<RequestCache>,
}

impl RequestContext {
    /// Creates a new context in the Active state.
    ///
    /// The context is not current anywhere until entered with [`scope`] or
    /// [`sync_scope`], or re-installed elsewhere by a
    /// [`ContextCarrier`](crate::carrier::ContextCarrier).
    ///
    /// [`scope`]: Self::scope
    /// [`sync_scope`]: Self::sync_scope
    pub fn new() -> Self {
        let id = ContextId::new();
        debug!("Initialized request context {id}");
        Self {
            inner: Arc::new(RequestCache::new(id)),
        }
    }

    /// Returns the context associated with the calling task or thread, if any.
    pub fn current() -> Option<Self> {
        CURRENT_CONTEXT.try_with(Clone::clone).unwrap_or(None)
    }

    /// The unique identifier of this context.
    pub fn id(&self) -> ContextId {
        self.inner.context_id()
    }

    /// Whether this context is still in the Active state.
    pub fn is_active(&self) -> bool {
        !self.inner.is_shut_down()
    }

    /// The cache owned by this context.
    pub fn cache(&self) -> &RequestCache {
        &self.inner
    }

    /// Ends this context: transitions it to the `ShutDown` state and discards
    /// every cache entry.
    ///
    /// After shutdown, every cache-backed command execution against this
    /// context fails with
    /// [`CommandError::ContextShutDown`](crate::errors::CommandError::ContextShutDown);
    /// a stale cache is never silently consulted. The current-context
    /// association itself ends when the enclosing [`scope`](Self::scope)
    /// exits.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::AlreadyShutDown`] if this context was already
    /// shut down; a double shutdown indicates a request-boundary bug.
    #[instrument(skip(self), fields(context_id = %self.id()))]
    pub fn shutdown(&self) -> ContextResult<()> {
        if self.inner.mark_shut_down() {
            return Err(ContextError::AlreadyShutDown(self.id()));
        }
        let discarded = self.inner.clear();
        debug!(
            "Shut down request context {} ({discarded} cache entries discarded)",
            self.id()
        );
        Ok(())
    }

    /// Runs `work` with this context installed as current, restoring the
    /// prior association afterwards.
    pub async fn scope<F>(&self, work: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_CONTEXT.scope(Some(self.clone()), work).await
    }

    /// Synchronous variant of [`scope`](Self::scope) for plain closures.
    pub fn sync_scope<F, R>(&self, work: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT_CONTEXT.sync_scope(Some(self.clone()), work)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}

impl PartialEq for RequestContext {
    /// Two handles are equal when they refer to the same underlying context.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RequestContext {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_is_active_with_empty_cache() {
        let context = RequestContext::new();
        assert!(context.is_active());
        assert!(context.cache().is_empty());
    }

    #[test]
    fn no_current_context_outside_scope() {
        assert!(RequestContext::current().is_none());
    }

    #[tokio::test]
    async fn scope_installs_and_restores() {
        let context = RequestContext::new();
        let seen = context
            .scope(async { RequestContext::current().map(|c| c.id()) })
            .await;
        assert_eq!(seen, Some(context.id()));
        assert!(RequestContext::current().is_none());
    }

    #[tokio::test]
    async fn nested_scope_shadows_outer_context() {
        let outer = RequestContext::new();
        let inner = RequestContext::new();

        outer
            .scope(async {
                assert_eq!(RequestContext::current(), Some(outer.clone()));
                inner
                    .scope(async {
                        assert_eq!(RequestContext::current(), Some(inner.clone()));
                    })
                    .await;
                assert_eq!(RequestContext::current(), Some(outer.clone()));
            })
            .await;
    }

    #[test]
    fn sync_scope_installs_for_closure() {
        let context = RequestContext::new();
        let seen = context.sync_scope(RequestContext::current);
        assert_eq!(seen, Some(context));
    }

    #[test]
    fn shutdown_clears_cache_and_deactivates() {
        let context = RequestContext::new();
        context.shutdown().unwrap();
        assert!(!context.is_active());
    }

    #[test]
    fn double_shutdown_is_an_error() {
        let context = RequestContext::new();
        context.shutdown().unwrap();
        assert_eq!(
            context.shutdown().unwrap_err(),
            ContextError::AlreadyShutDown(context.id())
        );
    }

    #[test]
    fn clones_share_one_context() {
        let context = RequestContext::new();
        let clone = context.clone();
        assert_eq!(context, clone);
        clone.shutdown().unwrap();
        assert!(!context.is_active());
    }
}
