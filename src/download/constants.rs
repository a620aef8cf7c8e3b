//! Constants for the download module (timeouts, admission, buffers).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large client jars).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default number of admission slots (simultaneous transfers).
pub const DEFAULT_CONCURRENCY: usize = 64;

/// Minimum allowed admission capacity.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed admission capacity.
pub const MAX_CONCURRENCY: usize = 256;

/// Default time the scheduler waits for a batch to drain before reconciling.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of download rounds (initial pass plus retries).
pub const DEFAULT_MAX_ROUNDS: u32 = 3;

/// Read buffer used while hashing files on disk.
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Files hashed concurrently during reconciliation.
pub const RECONCILE_PARALLELISM: usize = 16;

/// Existing files hashed concurrently before transfers are admitted.
///
/// Kept apart from the admission gate so verified files never hold a
/// network slot, and small enough that a large batch cannot run the
/// process out of file descriptors.
pub const PRECHECK_PARALLELISM: usize = 16;
