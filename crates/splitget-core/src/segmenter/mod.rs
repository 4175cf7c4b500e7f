//! Range math and download planning.
//!
//! Splits a resource into one contiguous byte range per worker and computes
//! HTTP Range header bounds.

mod range;

pub use range::{partition, ByteRange, DownloadPlan};
