//! Fixed binary layout of the checkpoint file.
//!
//! ```text
//! offset      size  field
//! 0           4     magic "SGCK"
//! 4           4     layout version
//! 8           4     worker count N
//! 12          4     reserved (0)
//! 16          8     total length
//! 24 + 16*i   8     slot i: resume offset
//! 32 + 16*i   8     slot i: end offset
//! ```
//!
//! Integers are big-endian. The file is exactly `24 + 16 * N` bytes and is
//! never resized after creation.

use super::error::CheckpointError;
use super::CheckpointEntry;

pub(crate) const MAGIC: [u8; 4] = *b"SGCK";
pub(crate) const VERSION: u32 = 1;
pub(crate) const HEADER_LEN: u64 = 24;
pub(crate) const SLOT_LEN: u64 = 16;

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub worker_count: u32,
    pub total_length: u64,
}

/// Byte offset of slot `worker`'s resume offset field.
pub(crate) fn resume_field_offset(worker: usize) -> u64 {
    HEADER_LEN + SLOT_LEN * worker as u64
}

/// Total file length for `worker_count` slots.
pub(crate) fn file_len(worker_count: usize) -> u64 {
    HEADER_LEN + SLOT_LEN * worker_count as u64
}

/// Header field for `n` workers; the count must fit in 32 bits.
pub(crate) fn worker_count_field(n: usize) -> Result<u32, CheckpointError> {
    u32::try_from(n).map_err(|_| CheckpointError::TooManyWorkers(n))
}

/// Encode the whole file: header followed by one slot per entry.
pub(crate) fn encode(
    total_length: u64,
    entries: &[CheckpointEntry],
) -> Result<Vec<u8>, CheckpointError> {
    let worker_count = worker_count_field(entries.len())?;
    let mut buf = Vec::with_capacity(file_len(entries.len()) as usize);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&VERSION.to_be_bytes());
    buf.extend_from_slice(&worker_count.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&total_length.to_be_bytes());
    for e in entries {
        buf.extend_from_slice(&e.resume_offset.to_be_bytes());
        buf.extend_from_slice(&e.end_offset.to_be_bytes());
    }
    Ok(buf)
}

pub(crate) fn decode_header(bytes: &[u8]) -> Result<Header, CheckpointError> {
    if (bytes.len() as u64) < HEADER_LEN {
        return Err(CheckpointError::corrupt(format!(
            "file is {} bytes, shorter than the {}-byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }
    if bytes[0..4] != MAGIC {
        return Err(CheckpointError::corrupt("bad magic"));
    }
    let version = read_u32(bytes, 4);
    if version != VERSION {
        return Err(CheckpointError::corrupt(format!(
            "unsupported layout version {}",
            version
        )));
    }
    Ok(Header {
        worker_count: read_u32(bytes, 8),
        total_length: read_u64(bytes, 16),
    })
}

/// Decode all slots. `bytes` must already be checked to hold `worker_count` slots.
pub(crate) fn decode_slots(bytes: &[u8], worker_count: usize) -> Vec<CheckpointEntry> {
    (0..worker_count)
        .map(|worker_id| {
            let at = resume_field_offset(worker_id) as usize;
            CheckpointEntry {
                worker_id,
                resume_offset: read_u64(bytes, at),
                end_offset: read_u64(bytes, at + 8),
            }
        })
        .collect()
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    u32::from_be_bytes(b)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(b)
}
