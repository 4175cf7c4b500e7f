//! HTTP access to the remote resource.
//!
//! [`RangeClient`] is the seam between the download engine and the network:
//! a metadata fetch for the total length and a ranged GET that pushes bytes
//! to a sink as they arrive. [`CurlRangeClient`] implements it over libcurl.

mod curl_client;
mod error;
pub mod parse;

pub use curl_client::CurlRangeClient;
pub use error::FetchError;

use std::time::Duration;

use crate::segmenter::ByteRange;

/// Receives each block of a ranged transfer in order. Returning an error
/// aborts the transfer; the error is handed back by `stream_range`.
pub type BlockSink<'a> = dyn FnMut(&[u8]) -> Result<(), FetchError> + 'a;

/// Ranged access to one HTTP resource.
pub trait RangeClient: Send + Sync {
    /// Total length of the resource in bytes.
    fn fetch_length(&self, url: &str) -> Result<u64, FetchError>;

    /// GET `range` (inclusive) and push the body to `sink` block by block.
    ///
    /// Returns the number of bytes delivered, which equals `range.len()` on
    /// success. Bytes handed to `sink` before an error are valid data for
    /// the leading part of the range.
    fn stream_range(
        &self,
        url: &str,
        range: ByteRange,
        sink: &mut BlockSink<'_>,
    ) -> Result<u64, FetchError>;
}

/// Per-request transport settings.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    /// Abort an attempt whose throughput stays below `low_speed_limit` bytes/s
    /// for `low_speed_time` (the read timeout).
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    /// Hard cap on a single attempt.
    pub attempt_timeout: Duration,
    /// Receive buffer size; `None` keeps the libcurl default.
    pub buffer_size: Option<usize>,
    pub max_redirections: u32,
    /// Extra request headers (`name`, `value`).
    pub headers: Vec<(String, String)>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(20),
            attempt_timeout: Duration::from_secs(3600),
            buffer_size: None,
            max_redirections: 10,
            headers: Vec::new(),
        }
    }
}
