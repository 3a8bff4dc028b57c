//! Process-wide request limits and timeouts.
//!
//! Defaults are intentionally conservative: a request head that does not
//! arrive within the timeout, or that grows past twice [`REQUEST_MAXIMUM`],
//! costs the client its connection rather than the server its memory.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Maximum size of a request head read in one pass, in bytes.
///
/// Each read pulls at most `REQUEST_MAXIMUM + 1` bytes off the socket, and a
/// connection whose buffered input exceeds `2 * REQUEST_MAXIMUM` is closed
/// without a response.
pub const REQUEST_MAXIMUM: usize = 8192;

static REQUEST_TIMEOUT_SECS: AtomicU64 = AtomicU64::new(30);

/// Changes the process-wide request timeout (default: 30 seconds).
///
/// A request that has not been fully received and dispatched within this
/// window is torn down together with its connection. Mostly useful to
/// shorten test runs.
pub fn set_request_timeout(seconds: u64) {
    REQUEST_TIMEOUT_SECS.store(seconds, Ordering::Relaxed);
}

/// Returns the current process-wide request timeout.
pub fn request_timeout() -> Duration {
    Duration::from_secs(REQUEST_TIMEOUT_SECS.load(Ordering::Relaxed))
}
