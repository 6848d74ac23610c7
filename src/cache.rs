//! The per-context get-or-compute cache table.
//!
//! `RequestCache` collapses concurrent and repeated executions that share a
//! cache key into a single underlying computation. The table maps caller-
//! defined [`CacheKey`]s to entries that are either in flight (a computation
//! is underway, with a completion channel other callers wait on) or completed
//! (an immutable value for the rest of the context's lifetime).
//!
//! The table lock is held only for individual map operations. Waiting for an
//! in-flight peer and running a computation both happen outside the lock, so
//! one key's slow computation never serializes access to unrelated keys.

#![allow(clippy::significant_drop_tightening)]

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::errors::{CommandError, CommandResult};
use crate::types::{CacheKey, ContextId};

/// A completed value, type-erased so one table serves every command value
/// type within a request.
type CachedValue = Arc<dyn Any + Send + Sync>;

/// The outcome published on an in-flight entry's completion channel.
type SlotOutcome = Result<CachedValue, CommandError>;

/// One slot in the cache table.
enum CacheSlot {
    /// A computation for this key is underway. Holds the receiving half of
    /// the completion channel; other callers wait on a clone of it.
    InFlight(watch::Receiver<Option<SlotOutcome>>),
    /// The computation finished. The value never changes for the remainder
    /// of the owning context's lifetime.
    Completed(CachedValue),
}

/// What a caller found (or installed) for a key, resolved under one lock
/// acquisition so that exactly one caller can win the in-flight slot.
enum Claim {
    /// This caller installed the in-flight marker and is the sole executor.
    Winner(watch::Sender<Option<SlotOutcome>>),
    /// Another caller is computing; wait on its completion channel.
    Waiter(watch::Receiver<Option<SlotOutcome>>),
    /// A completed value already exists.
    Hit(CachedValue),
}

/// Concurrency-safe get-or-compute table owned by exactly one request context.
///
/// The cache lives and dies with its context: it is created on context
/// initialization, cleared on shutdown, and rejects every operation after
/// shutdown. There is no eviction and no cross-context sharing.
pub struct RequestCache {
    context_id: ContextId,
    shut_down: AtomicBool,
    slots: RwLock<HashMap<CacheKey, CacheSlot>>,
}

impl RequestCache {
    /// Creates an empty cache owned by the context identified by `context_id`.
    pub(crate) fn new(context_id: ContextId) -> Self {
        Self {
            context_id,
            shut_down: AtomicBool::new(false),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// The identifier of the owning request context.
    pub const fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Whether the owning context has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// The number of entries (in-flight and completed) currently in the table.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Marks the cache shut down, returning whether it already was.
    pub(crate) fn mark_shut_down(&self) -> bool {
        self.shut_down.swap(true, Ordering::AcqRel)
    }

    /// Discards every entry, returning how many were dropped.
    ///
    /// Callers waiting on an in-flight entry keep their channel clone and are
    /// still woken when the winning execution publishes its outcome.
    pub(crate) fn clear(&self) -> usize {
        let mut slots = self.slots.write();
        let discarded = slots.len();
        slots.clear();
        discarded
    }

    /// Returns the cached value for `key`, computing it if necessary.
    ///
    /// The returned flag reports whether the value was a cache hit. Semantics
    /// per key:
    ///
    /// - `key == None`: caching is bypassed entirely; `compute` always runs
    ///   and the flag is `false`.
    /// - A completed entry exists: its value is returned with the flag `true`
    ///   and `compute` never runs.
    /// - An in-flight entry exists: this call suspends until the owning
    ///   execution publishes its outcome, then returns that value (flag
    ///   `true`) or its failure.
    /// - No entry exists: an in-flight marker is installed atomically, this
    ///   caller runs `compute`, and the outcome is published to every waiter.
    ///   Success is returned with the flag `false`; failure removes the entry
    ///   so a later call retries fresh.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::ContextShutDown`] once the owning context has
    /// been shut down, [`CommandError::TypeMismatch`] if the value cached
    /// under `key` is not a `V`, and [`CommandError::ExecutionAbandoned`] if
    /// the winning execution was dropped before publishing an outcome.
    pub async fn get_or_compute<V, F, Fut>(
        &self,
        key: Option<CacheKey>,
        compute: F,
    ) -> CommandResult<(V, bool)>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CommandResult<V>>,
    {
        if self.is_shut_down() {
            return Err(CommandError::ContextShutDown(self.context_id));
        }

        let Some(key) = key else {
            // No key: the uncacheable path, always a fresh execution.
            return Ok((compute().await?, false));
        };

        let claim = {
            let mut slots = self.slots.write();
            match slots.entry(key.clone()) {
                Entry::Occupied(entry) => match entry.get() {
                    CacheSlot::Completed(value) => Claim::Hit(Arc::clone(value)),
                    CacheSlot::InFlight(receiver) => Claim::Waiter(receiver.clone()),
                },
                Entry::Vacant(entry) => {
                    let (sender, receiver) = watch::channel(None);
                    entry.insert(CacheSlot::InFlight(receiver));
                    Claim::Winner(sender)
                }
            }
        };

        match claim {
            Claim::Hit(value) => {
                trace!(
                    "Cache hit for key '{key}' in request context {}",
                    self.context_id
                );
                Ok((downcast::<V>(&value, &key)?, true))
            }
            Claim::Waiter(receiver) => {
                trace!(
                    "Joining in-flight execution for key '{key}' in request context {}",
                    self.context_id
                );
                let value = self.wait_for_peer::<V>(&key, receiver).await?;
                Ok((value, true))
            }
            Claim::Winner(sender) => {
                let value = self.compute_and_publish(&key, &sender, compute).await?;
                Ok((value, false))
            }
        }
    }

    /// Suspends until the execution owning `key`'s in-flight entry publishes
    /// its outcome, then returns that outcome.
    async fn wait_for_peer<V>(
        &self,
        key: &CacheKey,
        mut receiver: watch::Receiver<Option<SlotOutcome>>,
    ) -> CommandResult<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_closed| CommandError::ExecutionAbandoned { key: key.clone() })?
            .clone();

        // wait_for only returns once an outcome has been published; a missing
        // value can only mean the channel closed under us.
        let Some(outcome) = outcome else {
            return Err(CommandError::ExecutionAbandoned { key: key.clone() });
        };

        match outcome {
            Ok(value) => downcast::<V>(&value, key),
            Err(error) => Err(error),
        }
    }

    /// Runs `compute` as the sole executor for `key` and publishes the
    /// outcome to every waiter.
    async fn compute_and_publish<V, F, Fut>(
        &self,
        key: &CacheKey,
        sender: &watch::Sender<Option<SlotOutcome>>,
        compute: F,
    ) -> CommandResult<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CommandResult<V>>,
    {
        trace!(
            "Cache miss for key '{key}' in request context {}; executing",
            self.context_id
        );

        // If this future is dropped before an outcome is published, the guard
        // removes the in-flight marker and the dropped sender wakes waiters
        // with a closed channel, so nobody hangs on an abandoned execution.
        let mut guard = InFlightGuard {
            cache: self,
            key,
            armed: true,
        };

        let result = compute().await;

        match result {
            Ok(value) => {
                let cached: CachedValue = Arc::new(value.clone());
                {
                    let mut slots = self.slots.write();
                    if self.is_shut_down() {
                        // The context ended mid-flight: deliver the outcome
                        // to waiters but retain nothing.
                        slots.remove(key);
                    } else {
                        slots.insert(key.clone(), CacheSlot::Completed(Arc::clone(&cached)));
                    }
                    let _ = sender.send(Some(Ok(cached)));
                }
                guard.armed = false;
                Ok(value)
            }
            Err(error) => {
                {
                    // Remove before releasing the lock so the next caller
                    // finds a vacant slot and retries fresh.
                    let mut slots = self.slots.write();
                    slots.remove(key);
                    let _ = sender.send(Some(Err(error.clone())));
                }
                guard.armed = false;
                debug!(
                    "Execution for key '{key}' in request context {} failed; cache entry discarded",
                    self.context_id
                );
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCache")
            .field("context_id", &self.context_id)
            .field("entries", &self.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Extracts a concretely typed value from a type-erased cache entry.
fn downcast<V>(value: &CachedValue, key: &CacheKey) -> CommandResult<V>
where
    V: Clone + Send + Sync + 'static,
{
    value
        .downcast_ref::<V>()
        .cloned()
        .ok_or_else(|| CommandError::TypeMismatch { key: key.clone() })
}

/// Removes the in-flight marker for a key whose winning execution went away
/// without publishing an outcome.
struct InFlightGuard<'a> {
    cache: &'a RequestCache,
    key: &'a CacheKey,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = self.cache.slots.write();
        if matches!(slots.get(self.key), Some(CacheSlot::InFlight(_))) {
            slots.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> RequestCache {
        RequestCache::new(ContextId::new())
    }

    fn key(raw: &str) -> Option<CacheKey> {
        Some(CacheKey::try_new(raw).unwrap())
    }

    #[tokio::test]
    async fn computes_and_caches_by_key() {
        let cache = cache();

        let (value, hit) = cache
            .get_or_compute(key("2"), || async { Ok(true) })
            .await
            .unwrap();
        assert!(value);
        assert!(!hit);

        // A second computation would return false; the cached true proves
        // the unit of work did not run again.
        let (value, hit) = cache
            .get_or_compute(key("2"), || async { Ok(false) })
            .await
            .unwrap();
        assert!(value);
        assert!(hit);
    }

    #[tokio::test]
    async fn null_key_always_computes() {
        let cache = cache();

        for _ in 0..3 {
            let (value, hit) = cache
                .get_or_compute(None, || async { Ok(7_u32) })
                .await
                .unwrap();
            assert_eq!(value, 7);
            assert!(!hit);
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn failure_removes_entry_for_retry() {
        let cache = cache();

        let result: CommandResult<(u32, bool)> = cache
            .get_or_compute(key("flaky"), || async {
                Err(CommandError::ExecutionFailed("boom".to_string()))
            })
            .await;
        assert_eq!(
            result.unwrap_err(),
            CommandError::ExecutionFailed("boom".to_string())
        );
        assert!(cache.is_empty());

        let (value, hit) = cache
            .get_or_compute(key("flaky"), || async { Ok(9_u32) })
            .await
            .unwrap();
        assert_eq!(value, 9);
        assert!(!hit);
    }

    #[tokio::test]
    async fn mismatched_value_type_is_an_error() {
        let cache = cache();

        cache
            .get_or_compute(key("shared"), || async { Ok(1_u64) })
            .await
            .unwrap();

        let result: CommandResult<(String, bool)> = cache
            .get_or_compute(key("shared"), || async { Ok("other".to_string()) })
            .await;
        assert!(matches!(
            result.unwrap_err(),
            CommandError::TypeMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn shut_down_cache_rejects_operations() {
        let cache = cache();
        assert!(!cache.mark_shut_down());
        cache.clear();

        let result: CommandResult<(u32, bool)> =
            cache.get_or_compute(key("2"), || async { Ok(1_u32) }).await;
        assert_eq!(
            result.unwrap_err(),
            CommandError::ContextShutDown(cache.context_id())
        );
    }

    #[tokio::test]
    async fn clear_reports_discarded_entries() {
        let cache = cache();
        cache
            .get_or_compute(key("a"), || async { Ok(1_u32) })
            .await
            .unwrap();
        cache
            .get_or_compute(key("b"), || async { Ok(2_u32) })
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }
}
