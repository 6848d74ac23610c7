//! Core types for the `reqcache` request caching library.
//!
//! This module defines the fundamental types used throughout the library.
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle.

use nutype::nutype;
use uuid::Uuid;

/// A unique identifier for one request context, using UUIDv7 format.
///
/// `ContextId` values are guaranteed to be UUIDv7, which provides:
/// - Time-based ordering capability
/// - Globally unique identification
/// - Monotonic sort order for contexts created in sequence
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Creates a new `ContextId` with the current timestamp.
    ///
    /// This is a convenience method that generates a new `UUIDv7`.
    pub fn new() -> Self {
        // This will always succeed as Uuid::now_v7() always returns a valid v7 UUID
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// A caller-defined identity that determines which command invocations are
/// considered "the same" for caching purposes.
///
/// `CacheKey` values are guaranteed to be non-empty and at most 512 characters.
/// No sanitization is applied: keys are case-sensitive and compared exactly as
/// supplied, so `"User-42"` and `"user-42"` are distinct cache identities.
#[nutype(
    validate(not_empty, len_char_max = 512),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CacheKey(String);

/// An informational group/category label declared by every command.
///
/// The group appears in log output so that executions of related commands can
/// be correlated. It plays no role in cache scoping: two commands in the same
/// group with different cache keys never share a result, and two commands in
/// different groups with the same key do.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CommandGroup(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_ids_are_unique() {
        let a = ContextId::new();
        let b = ContextId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn context_id_rejects_non_v7_uuid() {
        let v4 = Uuid::new_v4();
        assert!(ContextId::try_new(v4).is_err());
    }

    #[test]
    fn cache_key_rejects_empty() {
        assert!(CacheKey::try_new("").is_err());
    }

    #[test]
    fn cache_key_rejects_oversized() {
        let oversized = "k".repeat(513);
        assert!(CacheKey::try_new(oversized).is_err());
    }

    #[test]
    fn cache_keys_are_case_sensitive() {
        let upper = CacheKey::try_new("User-42").unwrap();
        let lower = CacheKey::try_new("user-42").unwrap();
        assert_ne!(upper, lower);
    }

    #[test]
    fn cache_key_preserves_whitespace() {
        let padded = CacheKey::try_new("  42  ").unwrap();
        assert_eq!(padded.as_ref(), "  42  ");
    }

    #[test]
    fn command_group_trims_and_rejects_blank() {
        let group = CommandGroup::try_new("  ExampleGroup  ").unwrap();
        assert_eq!(group.as_ref(), "ExampleGroup");
        assert!(CommandGroup::try_new("   ").is_err());
    }
}
