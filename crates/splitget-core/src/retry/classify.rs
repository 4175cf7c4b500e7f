//! Classify fetch errors into retry policy error kinds.

use crate::http::FetchError;
use crate::retry::policy::ErrorKind;

/// Classify an HTTP status code.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classify a curl transport error.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_partial_file() {
        return ErrorKind::Incomplete;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify a fetch error. Transport faults, 429/5xx and short bodies are
/// retried; 4xx, a range the server did not honor, storage and checkpoint
/// failures and a stop request are final.
pub fn classify(e: &FetchError) -> ErrorKind {
    match e {
        FetchError::Curl(ce) => classify_curl_error(ce),
        FetchError::Http(code) => classify_http_status(*code),
        FetchError::IncompleteRange { .. } => ErrorKind::Incomplete,
        FetchError::MetadataUnavailable(_)
        | FetchError::RangeNotHonored { .. }
        | FetchError::Storage(_)
        | FetchError::Checkpoint(_)
        | FetchError::Stopped => ErrorKind::Other,
    }
}
