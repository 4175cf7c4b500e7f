//! In-memory [`RangeClient`] with fault injection for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::control::CancelToken;
use crate::http::{BlockSink, FetchError, RangeClient};
use crate::segmenter::ByteRange;

/// One scripted misbehaviour, consumed by the next `stream_range` call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Deliver this many bytes, then end the stream early.
    CutAfter(usize),
    /// Answer with this HTTP status and no body.
    Status(u32),
    /// Deliver this many bytes, then claim success anyway.
    ShortOk(usize),
}

pub(crate) struct FakeClient {
    body: Vec<u8>,
    block_size: usize,
    script: Mutex<VecDeque<Fault>>,
    /// Any request covering this offset fails with the given status, forever.
    poisoned: Option<(u64, u32)>,
    /// Cancel the token once this many blocks have been delivered in total.
    cancel_after: Option<(usize, CancelToken)>,
    blocks_sent: AtomicUsize,
    pub(crate) requests: Mutex<Vec<ByteRange>>,
    pub(crate) length_calls: AtomicUsize,
}

impl FakeClient {
    pub(crate) fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            block_size: 64,
            script: Mutex::new(VecDeque::new()),
            poisoned: None,
            cancel_after: None,
            blocks_sent: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            length_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn block_size(mut self, n: usize) -> Self {
        self.block_size = n;
        self
    }

    pub(crate) fn script(self, faults: &[Fault]) -> Self {
        self.script.lock().unwrap().extend(faults.iter().copied());
        self
    }

    pub(crate) fn poison(mut self, offset: u64, status: u32) -> Self {
        self.poisoned = Some((offset, status));
        self
    }

    pub(crate) fn cancel_after(mut self, blocks: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((blocks, token));
        self
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Deterministic, non-repeating-looking test payload.
pub(crate) fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

impl RangeClient for FakeClient {
    fn fetch_length(&self, _url: &str) -> Result<u64, FetchError> {
        self.length_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.body.len() as u64)
    }

    fn stream_range(
        &self,
        _url: &str,
        range: ByteRange,
        sink: &mut BlockSink<'_>,
    ) -> Result<u64, FetchError> {
        self.requests.lock().unwrap().push(range);
        if let Some((offset, status)) = self.poisoned {
            if range.start <= offset && offset <= range.end {
                return Err(FetchError::Http(status));
            }
        }
        let fault = self.script.lock().unwrap().pop_front();
        let slice = &self.body[range.start as usize..=range.end as usize];
        let (limit, claim_ok) = match fault {
            Some(Fault::Status(code)) => return Err(FetchError::Http(code)),
            Some(Fault::CutAfter(n)) => (n.min(slice.len()), false),
            Some(Fault::ShortOk(n)) => (n.min(slice.len()), true),
            None => (slice.len(), false),
        };

        let mut sent = 0u64;
        for block in slice[..limit].chunks(self.block_size) {
            sink(block)?;
            sent += block.len() as u64;
            let n = self.blocks_sent.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some((after, token)) = &self.cancel_after {
                if n >= *after {
                    token.cancel();
                }
            }
        }
        if sent != range.len() && !claim_ok {
            return Err(FetchError::IncompleteRange {
                expected: range.len(),
                received: sent,
            });
        }
        Ok(sent)
    }
}
