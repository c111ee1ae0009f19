//! # Engine Bounds
//!
//! Hardcoded runtime constants for the Provena engine.
//!
//! The engine starts with zero data but fixed limits. These are compiled
//! into the binary and immutable at runtime. Every traversal, recursion,
//! and input field is bounded by one of them.

/// Default depth for lineage queries when the caller does not specify one.
///
/// Shared base layers make unbounded traversal from popular artifacts
/// pathological, so queries are depth-bounded unless explicitly unbounded.
pub const DEFAULT_TRACE_DEPTH: usize = 10;

/// Maximum traversal depth for lineage queries.
///
/// All queries must be computationally bounded. Requests above this are
/// clamped, including "unbounded" requests.
pub const MAX_TRACE_DEPTH: usize = 100;

/// Maximum nesting depth for recursive dispatch.
///
/// An image containing an archive containing an archive... stops here.
/// Content below this depth is skipped, not failed.
pub const MAX_NESTING_DEPTH: usize = 8;

/// Maximum length for artifact identifiers.
pub const MAX_ARTIFACT_ID_LENGTH: usize = 512;

/// Maximum length for component and ecosystem names.
///
/// Longer names are rejected by the normalizer. This prevents memory
/// exhaustion from malicious or malformed extractor input.
pub const MAX_NAME_LENGTH: usize = 1024;

/// Maximum length for repository URLs and revisions.
pub const MAX_SOURCE_FIELD_LENGTH: usize = 2048;

/// Maximum number of candidates a single extractor run may report.
///
/// A run exceeding this is rejected whole and recorded as a failure.
pub const MAX_CANDIDATES_PER_EXTRACTOR: usize = 10_000;

/// Number of times a transient store conflict is retried before the
/// ingestion is surfaced as failed.
pub const STORE_RETRY_LIMIT: usize = 3;

/// Base backoff between store-conflict retries, in milliseconds.
/// Retry N sleeps N * this value (linear, bounded by the retry limit).
pub const STORE_RETRY_BACKOFF_MS: u64 = 25;
