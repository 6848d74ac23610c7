//! `reqcache` - Request-scoped command result caching with context propagation
//!
//! Within one logical request, multiple executions of a command carrying the
//! same cache key collapse into a single underlying execution; every other
//! caller receives the already-computed result. The cache lives and dies with
//! its [`RequestContext`], and a [`ContextCarrier`] carries that context into
//! work dispatched to other tasks or threads so the caching contract survives
//! asynchronous dispatch.
//!
//! # Components
//!
//! - [`RequestContext`]: the scope of one request; owns the cache, has an
//!   explicit begin ([`RequestContext::new`]) and end
//!   ([`RequestContext::shutdown`]).
//! - [`RequestCache`]: the per-context concurrency-safe get-or-compute table.
//!   For a given (context, key) pair at most one computation ever runs;
//!   concurrent requesters wait for it instead of recomputing.
//! - [`Command`] / [`CommandEnvelope`]: the executable unit and the envelope
//!   that routes its execution through the current context's cache.
//! - [`ContextCarrier`]: snapshots the current context and re-installs it
//!   around a unit of work executed elsewhere.
//!
//! # Example
//!
//! ```rust,ignore
//! use reqcache::{
//!     CacheKey, Command, CommandEnvelope, CommandGroup, CommandResult, RequestContext,
//! };
//!
//! struct IsEven {
//!     value: u32,
//! }
//!
//! #[async_trait::async_trait]
//! impl Command for IsEven {
//!     type Value = bool;
//!
//!     fn group(&self) -> CommandGroup {
//!         CommandGroup::try_new("parity").expect("valid group")
//!     }
//!
//!     fn cache_key(&self) -> Option<CacheKey> {
//!         CacheKey::try_new(self.value.to_string()).ok()
//!     }
//!
//!     async fn run(&self) -> CommandResult<bool> {
//!         Ok(self.value % 2 == 0)
//!     }
//! }
//!
//! # async fn request_handler() -> CommandResult<()> {
//! let context = RequestContext::new();
//! context
//!     .scope(async {
//!         let mut first = CommandEnvelope::new(IsEven { value: 2 });
//!         assert!(first.execute().await?);
//!         assert!(!first.is_response_from_cache());
//!
//!         // Same key, same context: served from cache, run() not re-executed.
//!         let mut second = CommandEnvelope::new(IsEven { value: 2 });
//!         assert!(second.execute().await?);
//!         assert!(second.is_response_from_cache());
//!         Ok::<_, reqcache::CommandError>(())
//!     })
//!     .await?;
//! context.shutdown().expect("request ended once");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod carrier;
pub mod command;
pub mod context;
pub mod errors;
pub mod types;

pub use cache::RequestCache;
pub use carrier::ContextCarrier;
pub use command::{Command, CommandEnvelope};
pub use context::RequestContext;
pub use errors::{CommandError, CommandResult, ContextError, ContextResult};
pub use types::{CacheKey, CommandGroup, ContextId};
