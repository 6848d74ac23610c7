//! Error types for `reqcache`.
//!
//! This module provides error types for all failure scenarios in the request
//! caching system. The error design follows these principles:
//!
//! - **Rich error information**: Include the offending context or key
//! - **Type safety**: Different error types for different subsystems
//! - **Actionable**: Callers can determine how to handle each error
//!
//! # Error Categories
//!
//! - **`ContextError`**: Request context lifecycle failures
//! - **`CommandError`**: Command execution and cache coordination failures

use crate::types::{CacheKey, ContextId};
use thiserror::Error;

/// Type alias for context lifecycle operation results.
pub type ContextResult<T> = Result<T, ContextError>;

/// Type alias for command execution results.
///
/// All command methods return this result type, which either contains the
/// success value or a `CommandError` describing what went wrong.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors that can occur during request context lifecycle operations.
///
/// Operating on a context after shutdown is an error, never a silent no-op:
/// a stale context handle indicates a request-boundary bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// `shutdown` was called on a context that has already been shut down.
    #[error("request context {0} has already been shut down")]
    AlreadyShutDown(ContextId),
}

/// Errors that can occur while executing a command.
///
/// `CommandError` is `Clone` because a single underlying failure must be
/// delivered to every caller waiting on the same in-flight cache entry.
///
/// # Error Handling Strategy
///
/// - **`ContextShutDown`**: The request boundary ended; do not retry
/// - **`ExecutionFailed`**: Inspect the message; the cache entry was removed,
///   so a retry triggers a fresh execution
/// - **`TypeMismatch`**: Two unrelated command types collided on one cache
///   key; fix the key scheme
/// - **`ExecutionAbandoned`**: The winning execution was dropped before it
///   produced a result; a retry triggers a fresh execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// A cache-backed operation ran against a context that was shut down.
    #[error("request context {0} has been shut down")]
    ContextShutDown(ContextId),

    /// The command's unit of work reported a failure.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// A cached value for this key has a different concrete type than the
    /// requesting command expects.
    #[error("cached value for key '{key}' has a different type than requested")]
    TypeMismatch {
        /// The key on which two command value types collided.
        key: CacheKey,
    },

    /// The execution that owned the in-flight entry for this key was dropped
    /// before completing, so no result will ever arrive.
    #[error("in-flight execution for key '{key}' was dropped before completing")]
    ExecutionAbandoned {
        /// The key whose in-flight execution went away.
        key: CacheKey,
    },
}
