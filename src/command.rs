//! The command capability trait and its execution envelope.
//!
//! A [`Command`] is a self-contained executable unit: it supplies the unit of
//! work ([`Command::run`]), an informational group label, and optionally a
//! cache key. Commands do not talk to the cache themselves; they are executed
//! through a [`CommandEnvelope`], which resolves the current request context
//! and routes the execution through that context's cache.
//!
//! Many command instances may share one cache key. They are distinct objects
//! representing the same logical request for the same result, and within one
//! request context at most one of them ever runs.

use async_trait::async_trait;
use tracing::trace;

use crate::context::RequestContext;
use crate::errors::CommandResult;
use crate::types::{CacheKey, CommandGroup};

/// Core trait for cache-aware executable commands.
///
/// # Type Parameters
///
/// * `Value` - The result type of the command. It must be `Clone` because a
///   single computed value is handed to every caller that shares the cache
///   key, and `'static` because completed values outlive the execution that
///   produced them.
///
/// # Example
///
/// ```rust,ignore
/// struct FetchUser {
///     user_id: u64,
/// }
///
/// #[async_trait]
/// impl Command for FetchUser {
///     type Value = User;
///
///     fn group(&self) -> CommandGroup {
///         CommandGroup::try_new("users").expect("valid group")
///     }
///
///     fn cache_key(&self) -> Option<CacheKey> {
///         CacheKey::try_new(self.user_id.to_string()).ok()
///     }
///
///     async fn run(&self) -> CommandResult<User> {
///         backend::load_user(self.user_id)
///             .await
///             .map_err(|e| CommandError::ExecutionFailed(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait Command: Send + Sync {
    /// The result type this command produces.
    type Value: Clone + Send + Sync + 'static;

    /// The informational group/category label for this command.
    ///
    /// Groups correlate related commands in log output. They play no role in
    /// cache scoping.
    fn group(&self) -> CommandGroup;

    /// The cache key identifying this command's result within a request
    /// context, or `None` for a command that must never be cached.
    ///
    /// Must be a pure function of the command's own input attributes: the
    /// same logical input yields the same key.
    fn cache_key(&self) -> Option<CacheKey> {
        None
    }

    /// The unit of work. Arbitrary side effects are permitted; within one
    /// request context this runs at most once per cache key.
    async fn run(&self) -> CommandResult<Self::Value>;
}

/// Execution envelope around one command instance.
///
/// The envelope records whether the most recent execution was served from the
/// cache, which is per-instance state the [`Command`] trait itself cannot
/// carry.
#[derive(Debug)]
pub struct CommandEnvelope<C: Command> {
    command: C,
    response_from_cache: bool,
}

impl<C: Command> CommandEnvelope<C> {
    /// Wraps `command` for execution.
    pub const fn new(command: C) -> Self {
        Self {
            command,
            response_from_cache: false,
        }
    }

    /// Executes the command under the current request context.
    ///
    /// Resolves [`RequestContext::current`] at the moment of the call:
    ///
    /// - No context current: caching is disabled for this call; the unit of
    ///   work runs directly and [`is_response_from_cache`] reports `false`.
    ///   This is graceful degradation, not an error.
    /// - A context is current: the execution is routed through that context's
    ///   [`RequestCache::get_or_compute`](crate::cache::RequestCache::get_or_compute)
    ///   with this command's cache key. The call may suspend while a peer
    ///   execution for the same key is in flight.
    ///
    /// # Errors
    ///
    /// Propagates failures from the unit of work and from the cache layer,
    /// including `ContextShutDown` when the current context has already been
    /// shut down.
    ///
    /// [`is_response_from_cache`]: Self::is_response_from_cache
    pub async fn execute(&mut self) -> CommandResult<C::Value> {
        self.response_from_cache = false;

        let Some(context) = RequestContext::current() else {
            trace!(
                "No request context current; executing command in group '{}' uncached",
                self.command.group()
            );
            return self.command.run().await;
        };

        let key = self.command.cache_key();
        let (value, from_cache) = context
            .cache()
            .get_or_compute(key, || self.command.run())
            .await?;
        self.response_from_cache = from_cache;
        Ok(value)
    }

    /// Whether the most recent [`execute`](Self::execute) call on this
    /// instance was served from the cache.
    ///
    /// `false` before the first execution and after a failed one.
    pub const fn is_response_from_cache(&self) -> bool {
        self.response_from_cache
    }

    /// The wrapped command.
    pub const fn command(&self) -> &C {
        &self.command
    }

    /// Unwraps the envelope, returning the command.
    pub fn into_inner(self) -> C {
        self.command
    }
}

impl<C: Command> From<C> for CommandEnvelope<C> {
    fn from(command: C) -> Self {
        Self::new(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uncacheable;

    #[async_trait]
    impl Command for Uncacheable {
        type Value = u32;

        fn group(&self) -> CommandGroup {
            CommandGroup::try_new("test").unwrap()
        }

        async fn run(&self) -> CommandResult<u32> {
            Ok(41)
        }
    }

    #[test]
    fn cache_key_defaults_to_none() {
        assert!(Uncacheable.cache_key().is_none());
    }

    #[tokio::test]
    async fn executes_without_context() {
        let mut command = CommandEnvelope::new(Uncacheable);
        assert_eq!(command.execute().await.unwrap(), 41);
        assert!(!command.is_response_from_cache());
    }

    #[test]
    fn flag_is_false_before_first_execution() {
        let command = CommandEnvelope::new(Uncacheable);
        assert!(!command.is_response_from_cache());
    }
}
