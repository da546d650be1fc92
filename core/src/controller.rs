use crate::chunkset::{AdmitResult, ChunkSet};
use crate::coder::ErasureCoder;
use crate::demod::{ChannelSelect, DecodeEvent, Demodulator, SyncInfo};
use crate::header::ChunkHeader;
use crate::sniff::{self, ImageInfo};
use crate::{MAX_BLOCK_BYTES, MAX_IMAGE_DIM, MIN_IMAGE_DIM};
use log::{debug, info, warn};

/// Receiver state across decode events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// No lock; waiting for a preamble.
    Searching,
    /// Locked onto a transmission, no chunk seen yet.
    Synced,
    /// Locked and holding a partially collected chunk transfer.
    Collecting,
}

/// Everything the caller needs to present a finished transfer.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedImage {
    pub bytes: Vec<u8>,
    pub info: ImageInfo,
    pub call_sign: String,
    pub bit_flips: i32,
}

/// Status reported to the caller after a decode event; one per tick at most.
#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    PreambleFail,
    WeakSync { info: SyncInfo },
    ResourceExhausted,
    Synced { info: SyncInfo },
    DecodeFailed,
    ChunkReceived { have: usize, need: usize },
    ChunkDuplicate,
    ChunkRedundant,
    ChunkUnsupported,
    ChunkCorrupted,
    PayloadUnknown,
    PayloadReady(ReceivedImage),
}

/// Metadata for the current demodulator lock, valid from one `Synced`
/// event to the next (or to loss of lock).
#[derive(Clone, Debug)]
struct DecodeSession {
    info: SyncInfo,
}

/// Polling state machine that turns per-block decode events into validated
/// image payloads.
///
/// Drive it with [`ReassemblyController::tick`] once per audio block; every
/// event is processed to completion before the next tick, including any
/// erasure-recovery call. Releasing a [`Status::PayloadReady`] to the caller
/// is the only side effect beyond status reporting; storage and display stay
/// outside.
pub struct ReassemblyController<C: ErasureCoder> {
    coder: C,
    chunks: ChunkSet,
    session: Option<DecodeSession>,
    state: State,
    block: Vec<u8>,
}

impl<C: ErasureCoder> ReassemblyController<C> {
    pub fn new(coder: C) -> Self {
        Self {
            coder,
            chunks: ChunkSet::new(),
            session: None,
            state: State::Searching,
            block: vec![0u8; MAX_BLOCK_BYTES],
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Feed one audio block through the demodulator and handle whatever
    /// event it produces.
    pub fn tick(
        &mut self,
        demod: &mut dyn Demodulator,
        audio: &[i16],
        channel: ChannelSelect,
    ) -> Option<Status> {
        match demod.process(audio, channel) {
            DecodeEvent::NoEvent => None,
            DecodeEvent::PreambleFail => {
                self.state = State::Searching;
                Some(Status::PreambleFail)
            }
            DecodeEvent::WeakSync => {
                let info = demod.cached();
                debug!(
                    "weak sync: mode {} offset {:.1} Hz",
                    info.mode, info.carrier_offset
                );
                self.state = State::Searching;
                Some(Status::WeakSync { info })
            }
            DecodeEvent::ResourceExhausted => {
                warn!("demodulator out of resources, dropping transfer state");
                self.chunks.reset();
                self.state = State::Searching;
                Some(Status::ResourceExhausted)
            }
            DecodeEvent::Synced => {
                let info = demod.cached();
                info!(
                    "synced: {} mode {} offset {:.1} Hz",
                    info.call_sign_str(),
                    info.mode,
                    info.carrier_offset
                );
                self.session = Some(DecodeSession { info });
                self.state = State::Synced;
                Some(Status::Synced { info })
            }
            DecodeEvent::BlockReady => self.on_block_ready(demod),
        }
    }

    fn on_block_ready(&mut self, demod: &mut dyn Demodulator) -> Option<Status> {
        // Cannot happen with a well-behaved demodulator; a replayed capture
        // could fabricate it, so drop it rather than act without a session.
        if self.state == State::Searching || self.session.is_none() {
            return None;
        }
        let bit_flips = demod.fetch(&mut self.block);
        if bit_flips < 0 {
            debug!("block decode failed");
            return Some(Status::DecodeFailed);
        }
        match ChunkHeader::parse(&self.block) {
            Some(header) => Some(self.on_chunk(&header, bit_flips)),
            None => {
                // Non-chunked block: the raw bytes are the whole payload.
                let payload = self.block.clone();
                self.state = State::Synced;
                Some(self.classify(payload, bit_flips))
            }
        }
    }

    fn on_chunk(&mut self, header: &ChunkHeader, bit_flips: i32) -> Status {
        self.state = State::Collecting;
        match self.chunks.admit(header, &self.block, &mut self.coder) {
            AdmitResult::Rejected => Status::ChunkUnsupported,
            AdmitResult::Duplicate => Status::ChunkDuplicate,
            AdmitResult::Redundant => Status::ChunkRedundant,
            AdmitResult::ResourceExhausted => {
                warn!("erasure coder out of resources, dropping transfer state");
                self.state = State::Searching;
                Status::ResourceExhausted
            }
            AdmitResult::Admitted { chunks_so_far, block_count } => {
                info!("chunk {} of {}", chunks_so_far + 1, block_count);
                Status::ChunkReceived {
                    have: chunks_so_far + 1,
                    need: block_count,
                }
            }
            AdmitResult::Complete { .. } => self.on_complete(bit_flips),
        }
    }

    fn on_complete(&mut self, bit_flips: i32) -> Status {
        let mut payload = vec![0u8; self.chunks.payload_bytes()];
        let checksum = self.coder.recover(&mut payload, self.chunks.len());
        self.state = State::Synced;
        if checksum != self.chunks.checksum() {
            warn!(
                "recovered payload checksum {:#010x} != declared {:#010x}",
                checksum,
                self.chunks.checksum()
            );
            // The transfer is corrupt; only a fresh header restarts it.
            self.chunks.reset();
            return Status::ChunkCorrupted;
        }
        // Keep the completed set so late retransmissions report Redundant.
        self.classify(payload, bit_flips)
    }

    fn classify(&mut self, payload: Vec<u8>, bit_flips: i32) -> Status {
        let info = match sniff::probe(&payload) {
            Some(info) => info,
            None => {
                debug!("payload container not recognized");
                return Status::PayloadUnknown;
            }
        };
        if info.width < MIN_IMAGE_DIM
            || info.width > MAX_IMAGE_DIM
            || info.height < MIN_IMAGE_DIM
            || info.height > MAX_IMAGE_DIM
        {
            debug!("payload dimensions {}x{} out of range", info.width, info.height);
            return Status::PayloadUnknown;
        }
        let call_sign = self
            .session
            .as_ref()
            .map(|s| s.info.call_sign_str())
            .unwrap_or_default();
        info!(
            "{} {}x{} image from {} ({} bit flips)",
            info.format.name(),
            info.width,
            info.height,
            call_sign,
            bit_flips
        );
        Status::PayloadReady(ReceivedImage {
            bytes: payload,
            info,
            call_sign,
            bit_flips,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::{crc32, SystematicCoder};
    use crate::demod::SyncInfo;
    use crate::sniff::ImageFormat;
    use crate::{CALL_SIGN_BYTES, CHUNK_HEADER_BYTES};
    use std::collections::VecDeque;

    struct ScriptedDemod {
        events: VecDeque<DecodeEvent>,
        info: SyncInfo,
        blocks: VecDeque<(i32, Vec<u8>)>,
    }

    impl ScriptedDemod {
        fn new() -> Self {
            let mut call = [b' '; CALL_SIGN_BYTES];
            call[..5].copy_from_slice(b"N0CAL");
            Self {
                events: VecDeque::new(),
                info: SyncInfo {
                    carrier_offset: -12.5,
                    mode: 8,
                    call_sign: call,
                },
                blocks: VecDeque::new(),
            }
        }

        fn sync(&mut self) -> &mut Self {
            self.events.push_back(DecodeEvent::Synced);
            self
        }

        fn block(&mut self, bit_flips: i32, bytes: Vec<u8>) -> &mut Self {
            self.events.push_back(DecodeEvent::BlockReady);
            self.blocks.push_back((bit_flips, bytes));
            self
        }
    }

    impl Demodulator for ScriptedDemod {
        fn process(&mut self, _audio: &[i16], _channel: ChannelSelect) -> DecodeEvent {
            self.events.pop_front().unwrap_or(DecodeEvent::NoEvent)
        }

        fn cached(&mut self) -> SyncInfo {
            self.info
        }

        fn fetch(&mut self, block: &mut [u8]) -> i32 {
            let (flips, bytes) = self.blocks.pop_front().expect("no block scripted");
            block[..bytes.len()].copy_from_slice(&bytes);
            block[bytes.len()..].fill(0);
            flips
        }
    }

    fn tick(
        controller: &mut ReassemblyController<SystematicCoder>,
        demod: &mut ScriptedDemod,
    ) -> Option<Status> {
        controller.tick(demod, &[], ChannelSelect::Default)
    }

    fn png_payload(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 2, 0, 0, 0]);
        data
    }

    /// Split a payload into `count` chunked blocks with sequential idents
    /// starting at `count` (the lowest legal ident).
    fn chunked_blocks(payload: &[u8], count: usize) -> Vec<Vec<u8>> {
        let body_len = payload.len().div_ceil(count);
        let checksum = crc32(payload);
        payload
            .chunks(body_len)
            .enumerate()
            .map(|(i, body)| {
                let header = ChunkHeader {
                    block_count: count as u32,
                    block_ident: (count + i) as u16,
                    payload_bytes: payload.len() as u32,
                    payload_checksum: checksum,
                };
                let mut block = header.to_bytes().to_vec();
                block.extend_from_slice(body);
                // Pad the short final chunk to the shared body length.
                block.resize(CHUNK_HEADER_BYTES + body_len, 0);
                block
            })
            .collect()
    }

    #[test]
    fn test_searching_until_sync() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        demod.events.push_back(DecodeEvent::NoEvent);
        demod.events.push_back(DecodeEvent::PreambleFail);
        demod.sync();

        assert_eq!(tick(&mut controller, &mut demod), None);
        assert_eq!(tick(&mut controller, &mut demod), Some(Status::PreambleFail));
        assert_eq!(controller.state(), State::Searching);
        let status = tick(&mut controller, &mut demod).unwrap();
        assert!(matches!(status, Status::Synced { .. }));
        assert_eq!(controller.state(), State::Synced);
    }

    #[test]
    fn test_block_ready_without_lock_is_dropped() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        demod.block(0, png_payload(64, 64));

        assert_eq!(tick(&mut controller, &mut demod), None);
        assert_eq!(controller.state(), State::Searching);
    }

    #[test]
    fn test_single_block_payload_released() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        let payload = png_payload(64, 48);
        demod.sync();
        demod.block(3, payload.clone());

        tick(&mut controller, &mut demod);
        let status = tick(&mut controller, &mut demod).unwrap();
        match status {
            Status::PayloadReady(image) => {
                assert_eq!(&image.bytes[..payload.len()], &payload[..]);
                assert_eq!(image.info.format, ImageFormat::Png);
                assert_eq!(image.call_sign, "N0CAL");
                assert_eq!(image.bit_flips, 3);
            }
            other => panic!("expected PayloadReady, got {other:?}"),
        }
        assert_eq!(controller.state(), State::Synced);
    }

    #[test]
    fn test_negative_bit_flips_reports_decode_failed() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        demod.sync();
        demod.block(-1, vec![0u8; 16]);

        tick(&mut controller, &mut demod);
        assert_eq!(tick(&mut controller, &mut demod), Some(Status::DecodeFailed));
        assert_eq!(controller.state(), State::Synced);
    }

    #[test]
    fn test_undersized_image_rejected_as_unknown() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        demod.sync();
        demod.block(0, png_payload(8, 64));

        tick(&mut controller, &mut demod);
        assert_eq!(tick(&mut controller, &mut demod), Some(Status::PayloadUnknown));
    }

    #[test]
    fn test_chunked_transfer_end_to_end() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        let payload = png_payload(100, 100);
        let blocks = chunked_blocks(&payload, 3);
        demod.sync();
        for block in &blocks {
            demod.block(1, block.clone());
        }

        tick(&mut controller, &mut demod);
        assert_eq!(
            tick(&mut controller, &mut demod),
            Some(Status::ChunkReceived { have: 1, need: 3 })
        );
        assert_eq!(controller.state(), State::Collecting);
        assert_eq!(
            tick(&mut controller, &mut demod),
            Some(Status::ChunkReceived { have: 2, need: 3 })
        );
        let status = tick(&mut controller, &mut demod).unwrap();
        match status {
            Status::PayloadReady(image) => {
                assert_eq!(image.bytes, payload);
                assert_eq!(image.info.format, ImageFormat::Png);
            }
            other => panic!("expected PayloadReady, got {other:?}"),
        }
        assert_eq!(controller.state(), State::Synced);
    }

    #[test]
    fn test_duplicate_and_redundant_chunks_reported() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        let payload = png_payload(100, 100);
        let blocks = chunked_blocks(&payload, 2);
        // Same transfer triple but an ident the receiver never saw.
        let mut extra = ChunkHeader::parse(&blocks[0]).unwrap();
        extra.block_ident = 4;
        let mut extra_block = extra.to_bytes().to_vec();
        extra_block.extend_from_slice(&blocks[0][CHUNK_HEADER_BYTES..]);

        demod.sync();
        demod.block(0, blocks[0].clone());
        demod.block(0, blocks[0].clone()); // duplicate ident
        demod.block(0, blocks[1].clone()); // completes
        demod.block(0, extra_block); // unseen ident past completion

        tick(&mut controller, &mut demod);
        tick(&mut controller, &mut demod);
        assert_eq!(tick(&mut controller, &mut demod), Some(Status::ChunkDuplicate));
        assert!(matches!(
            tick(&mut controller, &mut demod),
            Some(Status::PayloadReady(_))
        ));
        assert_eq!(tick(&mut controller, &mut demod), Some(Status::ChunkRedundant));
    }

    #[test]
    fn test_checksum_mismatch_resets_and_allows_retry() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        let payload = png_payload(100, 100);
        let mut blocks = chunked_blocks(&payload, 2);
        // Corrupt one chunk body so recovery cannot match the checksum.
        blocks[1][CHUNK_HEADER_BYTES] ^= 0xFF;

        demod.sync();
        demod.block(0, blocks[0].clone());
        demod.block(0, blocks[1].clone());

        tick(&mut controller, &mut demod);
        tick(&mut controller, &mut demod);
        assert_eq!(tick(&mut controller, &mut demod), Some(Status::ChunkCorrupted));
        assert_eq!(controller.state(), State::Synced);

        // An intact retransmission of the same transfer completes.
        let good = chunked_blocks(&payload, 2);
        demod.block(0, good[0].clone());
        demod.block(0, good[1].clone());
        assert_eq!(
            tick(&mut controller, &mut demod),
            Some(Status::ChunkReceived { have: 1, need: 2 })
        );
        assert!(matches!(
            tick(&mut controller, &mut demod),
            Some(Status::PayloadReady(_))
        ));
    }

    #[test]
    fn test_new_header_mid_transfer_wins() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        let old = png_payload(100, 100);
        let new = png_payload(64, 64);
        let old_blocks = chunked_blocks(&old, 3);
        let new_blocks = chunked_blocks(&new, 2);

        demod.sync();
        demod.block(0, old_blocks[0].clone());
        demod.block(0, old_blocks[1].clone());
        demod.block(0, new_blocks[0].clone()); // different snapshot, resets
        demod.block(0, new_blocks[1].clone());

        tick(&mut controller, &mut demod);
        tick(&mut controller, &mut demod);
        tick(&mut controller, &mut demod);
        assert_eq!(
            tick(&mut controller, &mut demod),
            Some(Status::ChunkReceived { have: 1, need: 2 })
        );
        match tick(&mut controller, &mut demod).unwrap() {
            Status::PayloadReady(image) => assert_eq!(image.bytes, new),
            other => panic!("expected PayloadReady, got {other:?}"),
        }
    }

    /// Coder that accepts a fixed number of chunks, then refuses.
    struct FlakyCoder {
        accepts: usize,
    }

    impl ErasureCoder for FlakyCoder {
        fn ingest(&mut self, _block: &[u8], _position: usize, _ident: u16) -> bool {
            if self.accepts == 0 {
                return false;
            }
            self.accepts -= 1;
            true
        }

        fn recover(&mut self, _payload: &mut [u8], _chunks: usize) -> u32 {
            0
        }
    }

    #[test]
    fn test_coder_exhaustion_drops_lock_and_transfer() {
        let mut controller = ReassemblyController::new(FlakyCoder { accepts: 1 });
        let mut demod = ScriptedDemod::new();
        let payload = png_payload(100, 100);
        let blocks = chunked_blocks(&payload, 3);

        demod.sync();
        demod.block(0, blocks[0].clone());
        demod.block(0, blocks[1].clone()); // coder refuses this one
        demod.block(0, blocks[2].clone()); // arrives without a lock

        controller.tick(&mut demod, &[], ChannelSelect::Default);
        assert_eq!(
            controller.tick(&mut demod, &[], ChannelSelect::Default),
            Some(Status::ChunkReceived { have: 1, need: 3 })
        );
        assert_eq!(
            controller.tick(&mut demod, &[], ChannelSelect::Default),
            Some(Status::ResourceExhausted)
        );
        assert_eq!(controller.state(), State::Searching);

        // No fresh sync: the remaining block is dropped on the floor.
        assert_eq!(controller.tick(&mut demod, &[], ChannelSelect::Default), None);
        assert_eq!(controller.state(), State::Searching);
    }

    #[test]
    fn test_unsupported_chunk_leaves_transfer_intact() {
        let mut controller = ReassemblyController::new(SystematicCoder::new());
        let mut demod = ScriptedDemod::new();
        let payload = png_payload(100, 100);
        let blocks = chunked_blocks(&payload, 2);

        // Chunk with a reserved ident (below block count).
        let bad = ChunkHeader {
            block_count: 2,
            block_ident: 1,
            payload_bytes: payload.len() as u32,
            payload_checksum: crc32(&payload),
        };
        let mut bad_block = bad.to_bytes().to_vec();
        bad_block.resize(blocks[0].len(), 0);

        demod.sync();
        demod.block(0, blocks[0].clone());
        demod.block(0, bad_block);
        demod.block(0, blocks[1].clone());

        tick(&mut controller, &mut demod);
        tick(&mut controller, &mut demod);
        assert_eq!(
            tick(&mut controller, &mut demod),
            Some(Status::ChunkUnsupported)
        );
        assert!(matches!(
            tick(&mut controller, &mut demod),
            Some(Status::PayloadReady(_))
        ));
    }
}
