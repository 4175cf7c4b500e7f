//! libcurl implementation of [`RangeClient`].

use std::cell::{Cell, RefCell};
use std::str;

use curl::easy::{Easy, List};

use super::parse::{parse_headers, ResponseHead};
use super::{BlockSink, ClientOptions, FetchError, RangeClient};
use crate::segmenter::ByteRange;

/// Range client backed by one curl Easy handle per request.
#[derive(Debug, Clone, Default)]
pub struct CurlRangeClient {
    options: ClientOptions,
}

impl CurlRangeClient {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    fn easy(&self, url: &str) -> Result<Easy, curl::Error> {
        let o = &self.options;
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(o.max_redirections)?;
        easy.connect_timeout(o.connect_timeout)?;
        easy.low_speed_limit(o.low_speed_limit)?;
        easy.low_speed_time(o.low_speed_time)?;
        easy.timeout(o.attempt_timeout)?;
        if let Some(sz) = o.buffer_size {
            easy.buffer_size(sz)?;
        }
        if !o.headers.is_empty() {
            let mut list = List::new();
            for (k, v) in &o.headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))?;
            }
            easy.http_headers(list)?;
        }
        Ok(easy)
    }

    /// HEAD request; returns the parsed response head of a 2xx answer.
    fn head(&self, url: &str) -> Result<ResponseHead, FetchError> {
        let mut lines: Vec<String> = Vec::new();
        let mut easy = self.easy(url)?;
        easy.nobody(true)?;
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                push_header_line(&mut lines, data);
                true
            })?;
            transfer.perform()?;
        }
        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(FetchError::Http(code));
        }
        Ok(parse_headers(&lines))
    }

    /// `Range: bytes=0-0` GET; learns the total from `Content-Range` (or from
    /// `Content-Length` when the server ignores the range). The body is discarded.
    fn probe_range(&self, url: &str) -> Result<Option<u64>, FetchError> {
        let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let cut_short = Cell::new(false);
        let mut easy = self.easy(url)?;
        easy.range("0-0")?;
        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                push_header_line(&mut lines.borrow_mut(), data);
                true
            })?;
            transfer.write_function(|data| {
                if parse_headers(&lines.borrow()).status == Some(206) {
                    return Ok(data.len());
                }
                // Full body incoming; headers are all we need.
                cut_short.set(true);
                Ok(0)
            })?;
            transfer.perform()
        };
        if let Err(e) = performed {
            if !(cut_short.get() && e.is_write_error()) {
                return Err(e.into());
            }
        }

        let head = parse_headers(&lines.into_inner());
        Ok(match head.status {
            Some(206) | Some(416) => head.content_range_total,
            Some(200) => head.content_length,
            _ => None,
        })
    }
}

impl RangeClient for CurlRangeClient {
    fn fetch_length(&self, url: &str) -> Result<u64, FetchError> {
        match self.head(url) {
            Ok(ResponseHead {
                content_length: Some(len),
                ..
            }) => return Ok(len),
            Ok(_) => tracing::debug!(url, "HEAD carried no Content-Length, probing with a range GET"),
            Err(e) => tracing::debug!(url, error = %e, "HEAD failed, probing with a range GET"),
        }
        match self.probe_range(url) {
            Ok(Some(total)) => Ok(total),
            Ok(None) => Err(FetchError::MetadataUnavailable(
                "no Content-Length or Content-Range total".to_string(),
            )),
            Err(e) => Err(FetchError::MetadataUnavailable(e.to_string())),
        }
    }

    fn stream_range(
        &self,
        url: &str,
        range: ByteRange,
        sink: &mut BlockSink<'_>,
    ) -> Result<u64, FetchError> {
        let expected = range.len();
        let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let checked = Cell::new(false);
        let received = Cell::new(0u64);
        let failure: RefCell<Option<FetchError>> = RefCell::new(None);

        tracing::trace!(url, range = %range.header_value(), "ranged GET");
        let mut easy = self.easy(url)?;
        easy.range(&format!("{}-{}", range.start, range.end))?;
        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                push_header_line(&mut lines.borrow_mut(), data);
                true
            })?;
            transfer.write_function(|data| {
                if !checked.get() {
                    checked.set(true);
                    if let Err(e) = check_partial_response(&parse_headers(&lines.borrow()), range) {
                        *failure.borrow_mut() = Some(e);
                        return Ok(0);
                    }
                }
                let remaining = expected - received.get();
                let overrun = data.len() as u64 > remaining;
                let block = if overrun { &data[..remaining as usize] } else { data };
                if !block.is_empty() {
                    if let Err(e) = sink(block) {
                        *failure.borrow_mut() = Some(e);
                        return Ok(0);
                    }
                    received.set(received.get() + block.len() as u64);
                }
                if overrun {
                    *failure.borrow_mut() = Some(FetchError::RangeNotHonored { status: 206 });
                    return Ok(0);
                }
                Ok(data.len())
            })?;
            transfer.perform()
        };

        if let Err(e) = performed {
            return Err(failure.into_inner().unwrap_or(FetchError::Curl(e)));
        }
        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(FetchError::Http(code));
        }
        if !checked.get() {
            // No body arrived at all; still insist on a proper 206.
            check_partial_response(&parse_headers(&lines.into_inner()), range)?;
        }
        let got = received.get();
        if got != expected {
            return Err(FetchError::IncompleteRange {
                expected,
                received: got,
            });
        }
        Ok(got)
    }
}

/// A ranged GET must answer 206 with a Content-Range matching the request.
fn check_partial_response(head: &ResponseHead, range: ByteRange) -> Result<(), FetchError> {
    let status = head.status.unwrap_or(0);
    if !(200..300).contains(&status) {
        return Err(FetchError::Http(status));
    }
    if status != 206 || head.content_range != Some((range.start, range.end)) {
        return Err(FetchError::RangeNotHonored { status });
    }
    Ok(())
}

fn push_header_line(lines: &mut Vec<String>, data: &[u8]) {
    if let Ok(s) = str::from_utf8(data) {
        lines.push(s.trim_end().to_string());
    }
}
