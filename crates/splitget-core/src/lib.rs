pub mod config;
pub mod logging;

pub mod checkpoint;
pub mod control;
pub mod coordinator;
pub mod downloader;
pub mod http;
pub mod progress;
pub mod retry;
pub mod segmenter;
pub mod storage;
pub mod url_model;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{Coordinator, DownloadError, DownloadOutcome, MAX_WORKERS};
