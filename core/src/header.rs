use crate::CHUNK_HEADER_BYTES;

/// Magic tag marking a block as one chunk of a split transfer.
pub const CHUNK_MAGIC: [u8; 3] = *b"CRS";

/// Parsed 14-byte chunk header prefix.
///
/// Blocks without the magic tag carry a complete payload on their own and
/// never reach this type. Field values are decoded as-is; range checks are
/// the admission logic's job so parsing stays pure and total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Chunks needed for this transfer, wire-encoded as `raw + 1`.
    /// Wider than the wire field so the maximum raw value decodes to
    /// 65536 instead of wrapping to 0.
    pub block_count: u32,
    /// Identifier of this chunk in the erasure code's symbol space.
    pub block_ident: u16,
    /// Total reconstructed payload length, wire-encoded as `raw + 1`.
    pub payload_bytes: u32,
    /// CRC-32 the reconstructed payload must match.
    pub payload_checksum: u32,
}

impl ChunkHeader {
    /// Parse the chunk header prefix of a decoded block.
    ///
    /// Returns `None` when the magic tag is absent (or the block is too
    /// short to carry a header), meaning the block is a non-chunked,
    /// already-complete payload.
    pub fn parse(block: &[u8]) -> Option<Self> {
        if block.len() < CHUNK_HEADER_BYTES || block[..3] != CHUNK_MAGIC {
            return None;
        }
        let block_count = u16::from_le_bytes([block[3], block[4]]) as u32 + 1;
        let block_ident = u16::from_le_bytes([block[5], block[6]]);
        let payload_bytes = u32::from_le_bytes([block[7], block[8], block[9], 0]) + 1;
        let payload_checksum = u32::from_le_bytes([block[10], block[11], block[12], block[13]]);
        Some(Self {
            block_count,
            block_ident,
            payload_bytes,
            payload_checksum,
        })
    }

    /// Encode the header back to its wire form.
    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_BYTES] {
        let mut bytes = [0u8; CHUNK_HEADER_BYTES];
        bytes[..3].copy_from_slice(&CHUNK_MAGIC);
        bytes[3..5].copy_from_slice(&(self.block_count.wrapping_sub(1) as u16).to_le_bytes());
        bytes[5..7].copy_from_slice(&self.block_ident.to_le_bytes());
        bytes[7..10].copy_from_slice(&self.payload_bytes.wrapping_sub(1).to_le_bytes()[..3]);
        bytes[10..14].copy_from_slice(&self.payload_checksum.to_le_bytes());
        bytes
    }

    /// Snapshot triple that defines a transfer.
    pub(crate) fn snapshot(&self) -> (u32, u32, u32) {
        (self.block_count, self.payload_bytes, self.payload_checksum)
    }
}
