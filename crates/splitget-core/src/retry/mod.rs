//! Retry and backoff policy.
//!
//! Classifies transfer errors (timeouts, throttling, connection failures,
//! early closes) and computes bounded exponential backoff so a worker never
//! spins forever against an unreachable server.

mod classify;
mod policy;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
