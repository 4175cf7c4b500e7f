//! Byte range type and partitioning.

/// An inclusive byte range `[start, end]` of the remote resource.
///
/// Empty when `start == end + 1`. Only the partitioner and the checkpoint
/// loader build ranges, so `start <= end + 1` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte (inclusive).
    pub start: u64,
    /// Last byte (inclusive).
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// The empty range positioned right after `end`.
    pub fn empty_after(end: u64) -> Self {
        Self {
            start: end + 1,
            end,
        }
    }

    /// Length in bytes (0 for an empty range).
    pub fn len(&self) -> u64 {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offset one past the last byte; a worker whose resume offset reaches it is done.
    pub fn end_exclusive(&self) -> u64 {
        self.end + 1
    }

    /// The tail `[offset, end]` still to be fetched when resuming at `offset`.
    pub fn remaining_from(&self, offset: u64) -> ByteRange {
        ByteRange {
            start: offset.max(self.start),
            end: self.end,
        }
    }

    /// HTTP Range header value: `bytes=start-end`.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Ranges assigned to workers for one download attempt. Index == worker id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub total_length: u64,
    pub ranges: Vec<ByteRange>,
}

impl DownloadPlan {
    pub fn worker_count(&self) -> usize {
        self.ranges.len()
    }

    /// True if the ranges are contiguous, ordered, non-overlapping and cover
    /// exactly `[0, total_length - 1]`. Trailing empty ranges sit at `total_length`.
    pub fn is_partition(&self) -> bool {
        if self.total_length == 0 {
            return self.ranges.is_empty();
        }
        let mut next = 0u64;
        for r in &self.ranges {
            if r.start != next || r.start > r.end_exclusive() {
                return false;
            }
            next = r.end_exclusive();
        }
        next == self.total_length
    }
}

/// Partitions `total_length` bytes into `worker_count` contiguous ranges.
///
/// Every worker gets `ceil(total_length / worker_count)` bytes except the last
/// non-empty one, which is clipped at `total_length - 1`. Workers whose start
/// falls past the end (more workers than bytes) get an empty range at
/// `total_length`. Zero length or zero workers yield a plan with no ranges.
pub fn partition(total_length: u64, worker_count: usize) -> DownloadPlan {
    if total_length == 0 || worker_count == 0 {
        return DownloadPlan {
            total_length,
            ranges: Vec::new(),
        };
    }

    let per_worker = total_length.div_ceil(worker_count as u64);
    let last = total_length - 1;
    let ranges = (0..worker_count as u64)
        .map(|i| {
            let start = i.saturating_mul(per_worker);
            if start >= total_length {
                ByteRange::empty_after(last)
            } else {
                ByteRange::new(start, (start + per_worker - 1).min(last))
            }
        })
        .collect();

    DownloadPlan {
        total_length,
        ranges,
    }
}
