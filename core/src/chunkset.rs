use crate::coder::ErasureCoder;
use crate::header::ChunkHeader;
use crate::{MAX_BLOCK_COUNT, MAX_PAYLOAD_BYTES};
use std::collections::HashSet;

/// Outcome of offering one chunked block to the current transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmitResult {
    /// Header fields outside protocol bounds; nothing was touched.
    Rejected,
    /// Ident already admitted for this transfer; nothing was touched.
    Duplicate,
    /// Transfer already has enough chunks; nothing was touched.
    Redundant,
    /// Chunk forwarded to the coder. `chunks_so_far` counts admissions
    /// before this one.
    Admitted { chunks_so_far: usize, block_count: usize },
    /// Like `Admitted`, but the transfer now has every chunk it needs.
    Complete { chunks_so_far: usize },
    /// The coder refused the chunk; the transfer was abandoned and must
    /// restart from scratch.
    ResourceExhausted,
}

/// Per-transfer bookkeeping: the header snapshot that defines the transfer
/// in progress and the set of idents already handed to the erasure coder.
///
/// A header disagreeing with the snapshot silently starts a fresh transfer
/// (latest header wins); everything else is non-destructive, so a stray or
/// late chunk can never corrupt a valid transfer in progress.
#[derive(Debug, Default)]
pub struct ChunkSet {
    block_count: u32,
    payload_bytes: u32,
    checksum: u32,
    admitted: HashSet<u16>,
}

impl ChunkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one chunked block against the current transfer, forwarding
    /// it to `coder` when it is new and in bounds.
    pub fn admit(
        &mut self,
        header: &ChunkHeader,
        block: &[u8],
        coder: &mut dyn ErasureCoder,
    ) -> AdmitResult {
        // Bounds first: a malformed header never disturbs a valid transfer.
        if header.block_count as usize > MAX_BLOCK_COUNT
            || (header.block_ident as u32) < header.block_count
            || header.payload_bytes as usize > MAX_PAYLOAD_BYTES
        {
            return AdmitResult::Rejected;
        }
        if self.snapshot() != header.snapshot() {
            // Latest header wins: drop whatever was collected and adopt it.
            self.admitted.clear();
            self.block_count = header.block_count;
            self.payload_bytes = header.payload_bytes;
            self.checksum = header.payload_checksum;
        }
        if self.admitted.contains(&header.block_ident) {
            return AdmitResult::Duplicate;
        }
        if self.admitted.len() == self.block_count as usize {
            return AdmitResult::Redundant;
        }
        let chunks_so_far = self.admitted.len();
        if !coder.ingest(block, chunks_so_far, header.block_ident) {
            self.reset();
            return AdmitResult::ResourceExhausted;
        }
        self.admitted.insert(header.block_ident);
        if self.is_complete() {
            AdmitResult::Complete { chunks_so_far }
        } else {
            AdmitResult::Admitted {
                chunks_so_far,
                block_count: self.block_count as usize,
            }
        }
    }

    /// Discard the snapshot and all admitted idents; the next header starts
    /// a fresh transfer.
    pub fn reset(&mut self) {
        self.block_count = 0;
        self.payload_bytes = 0;
        self.checksum = 0;
        self.admitted.clear();
    }

    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.block_count != 0 && self.admitted.len() == self.block_count as usize
    }

    pub fn block_count(&self) -> usize {
        self.block_count as usize
    }

    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes as usize
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    fn snapshot(&self) -> (u32, u32, u32) {
        (self.block_count, self.payload_bytes, self.checksum)
    }
}
