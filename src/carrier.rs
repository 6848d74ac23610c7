//! Context propagation across task and thread boundaries.
//!
//! The current-context association is per-thread-of-control state, so work
//! dispatched to another task or thread runs with no context (or with that
//! worker's own, unrelated context) and cache lookups silently stop matching.
//! A [`ContextCarrier`] closes this hole: it snapshots the current context at
//! construction and re-installs it around the dispatched unit of work,
//! wherever and whenever that work runs.

use std::future::Future;

use tracing::trace;

use crate::context::{RequestContext, CURRENT_CONTEXT};

/// A snapshot of the current request context, ready to be re-installed
/// around a unit of work executed elsewhere.
///
/// The carrier does not own the context; it only associates it with the
/// wrapped work for that work's duration. A carrier constructed where no
/// context is current holds `None`, and invoking it masks whatever context
/// the executing thread of control happens to have, exactly as propagating
/// "no context" should.
///
/// # Example
///
/// ```rust,ignore
/// let context = RequestContext::new();
/// context
///     .scope(async {
///         // Runs on a pool worker, yet sees this request's context and
///         // therefore its cache.
///         let handle = tokio::spawn(ContextCarrier::wrap(async {
///             CommandEnvelope::new(FetchUser::new(42)).execute().await
///         }));
///         handle.await
///     })
///     .await;
/// ```
#[derive(Debug, Clone)]
pub struct ContextCarrier {
    context: Option<RequestContext>,
}

impl ContextCarrier {
    /// Snapshots the context currently associated with the calling task or
    /// thread (which may be none).
    pub fn capture() -> Self {
        let context = RequestContext::current();
        match &context {
            Some(context) => trace!("Captured request context {} for propagation", context.id()),
            None => trace!("Captured empty context snapshot for propagation"),
        }
        Self { context }
    }

    /// The snapshotted context, if one was current at capture time.
    pub const fn context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    /// Runs `work` with the snapshot installed as the current context,
    /// restoring the prior association afterwards, even if `work` panics.
    pub async fn run<F>(self, work: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_CONTEXT.scope(self.context, work).await
    }

    /// Synchronous variant of [`run`](Self::run) for closures dispatched to
    /// plain worker threads.
    pub fn run_sync<F, R>(self, work: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT_CONTEXT.sync_scope(self.context, work)
    }

    /// Captures the current context now and returns a future that runs `work`
    /// under it later, wherever that future is awaited.
    ///
    /// This is the one-step form of [`capture`](Self::capture) followed by
    /// [`run`](Self::run), for handing work straight to an executor.
    pub fn wrap<F>(work: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        Self::capture().run(work)
    }
}
