use crate::CHUNK_HEADER_BYTES;

/// CRC-32/IEEE over reconstructed payload bytes.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

/// Erasure-coding engine boundary.
///
/// The production engine (Cauchy Reed-Solomon over the chunk symbol space)
/// lives outside this crate; the core only feeds it chunks and asks for the
/// reconstructed payload once enough are present.
pub trait ErasureCoder {
    /// Absorb one decoded block at `position` for symbol `ident`.
    /// Returns false on internal resource exhaustion.
    fn ingest(&mut self, block: &[u8], position: usize, ident: u16) -> bool;

    /// Reconstruct the full payload into `payload` from `chunks` ingested
    /// blocks and return the checksum over the reconstructed bytes
    /// (0 on failure; the caller compares against the declared checksum).
    fn recover(&mut self, payload: &mut [u8], chunks: usize) -> u32;
}

/// k-of-k reference coder: every chunk is a sequential slice of the payload
/// and recovery is concatenation in ident order.
///
/// Good enough for replayed captures that lost nothing and for exercising
/// the reassembly logic; anything needing actual erasure recovery plugs in
/// the external engine instead.
#[derive(Default)]
pub struct SystematicCoder {
    slots: Vec<(u16, Vec<u8>)>,
}

impl SystematicCoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErasureCoder for SystematicCoder {
    fn ingest(&mut self, block: &[u8], position: usize, ident: u16) -> bool {
        if block.len() < CHUNK_HEADER_BYTES {
            return false;
        }
        let body = block[CHUNK_HEADER_BYTES..].to_vec();
        if position < self.slots.len() {
            self.slots[position] = (ident, body);
        } else {
            self.slots.push((ident, body));
        }
        true
    }

    fn recover(&mut self, payload: &mut [u8], chunks: usize) -> u32 {
        if chunks > self.slots.len() {
            return 0;
        }
        let mut ordered: Vec<&(u16, Vec<u8>)> = self.slots[..chunks].iter().collect();
        ordered.sort_by_key(|(ident, _)| *ident);

        let mut written = 0;
        for (_, body) in ordered {
            if written >= payload.len() {
                break;
            }
            let take = body.len().min(payload.len() - written);
            payload[written..written + take].copy_from_slice(&body[..take]);
            written += take;
        }
        if written < payload.len() {
            return 0;
        }
        crc32(payload)
    }
}
