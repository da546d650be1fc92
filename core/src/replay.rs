//! Recorded decode-event captures.
//!
//! A capture is a flat byte stream of the events a demodulator produced
//! during one listening session, so the reassembly logic can be driven
//! off-line: from tests, from the CLI, or from a capture taken on real
//! hardware. The audio itself is not recorded; the capture stands in for
//! the RF front end.

use crate::demod::{ChannelSelect, DecodeEvent, Demodulator, SyncInfo};
use crate::error::{ReceiverError, Result};
use crate::{CALL_SIGN_BYTES, MAX_BLOCK_BYTES};
use std::collections::VecDeque;

const CAPTURE_MAGIC: [u8; 4] = *b"WPXR";
const CAPTURE_VERSION: u8 = 1;

const TAG_PREAMBLE_FAIL: u8 = 0x01;
const TAG_WEAK_SYNC: u8 = 0x02;
const TAG_SYNCED: u8 = 0x03;
const TAG_BLOCK_READY: u8 = 0x04;
const TAG_RESOURCE_EXHAUSTED: u8 = 0x05;

/// One recorded demodulator event.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureRecord {
    PreambleFail,
    WeakSync(SyncInfo),
    Synced(SyncInfo),
    BlockReady { bit_flips: i32, block: Vec<u8> },
    ResourceExhausted,
}

/// Serializes capture records into the `WPXR` byte format.
pub struct CaptureWriter {
    buf: Vec<u8>,
}

impl Default for CaptureWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureWriter {
    pub fn new() -> Self {
        Self {
            buf: [CAPTURE_MAGIC.as_slice(), &[CAPTURE_VERSION]].concat(),
        }
    }

    pub fn record(&mut self, record: &CaptureRecord) -> Result<()> {
        match record {
            CaptureRecord::PreambleFail => self.buf.push(TAG_PREAMBLE_FAIL),
            CaptureRecord::WeakSync(info) => {
                self.buf.push(TAG_WEAK_SYNC);
                self.put_sync_info(info);
            }
            CaptureRecord::Synced(info) => {
                self.buf.push(TAG_SYNCED);
                self.put_sync_info(info);
            }
            CaptureRecord::BlockReady { bit_flips, block } => {
                if block.len() > MAX_BLOCK_BYTES {
                    return Err(ReceiverError::OversizedBlock { got: block.len() });
                }
                self.buf.push(TAG_BLOCK_READY);
                self.buf.extend_from_slice(&bit_flips.to_le_bytes());
                self.buf.extend_from_slice(&(block.len() as u16).to_le_bytes());
                self.buf.extend_from_slice(block);
            }
            CaptureRecord::ResourceExhausted => self.buf.push(TAG_RESOURCE_EXHAUSTED),
        }
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn put_sync_info(&mut self, info: &SyncInfo) {
        self.buf.extend_from_slice(&info.carrier_offset.to_le_bytes());
        self.buf.push(info.mode);
        self.buf.extend_from_slice(&info.call_sign);
    }
}

/// Parses the `WPXR` byte format back into records.
#[derive(Debug)]
pub struct CaptureReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> CaptureReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(ReceiverError::Truncated);
        }
        if data[..4] != CAPTURE_MAGIC {
            return Err(ReceiverError::BadMagic);
        }
        if data[4] != CAPTURE_VERSION {
            return Err(ReceiverError::BadVersion(data[4]));
        }
        Ok(Self { data, pos: 5 })
    }

    /// Parse every remaining record.
    pub fn records(mut self) -> Result<Vec<CaptureRecord>> {
        let mut records = Vec::new();
        while self.pos < self.data.len() {
            records.push(self.next_record()?);
        }
        Ok(records)
    }

    fn next_record(&mut self) -> Result<CaptureRecord> {
        let tag = self.take(1)?[0];
        match tag {
            TAG_PREAMBLE_FAIL => Ok(CaptureRecord::PreambleFail),
            TAG_WEAK_SYNC => Ok(CaptureRecord::WeakSync(self.take_sync_info()?)),
            TAG_SYNCED => Ok(CaptureRecord::Synced(self.take_sync_info()?)),
            TAG_BLOCK_READY => {
                let flips = self.take(4)?;
                let bit_flips = i32::from_le_bytes([flips[0], flips[1], flips[2], flips[3]]);
                let len = self.take(2)?;
                let len = u16::from_le_bytes([len[0], len[1]]) as usize;
                if len > MAX_BLOCK_BYTES {
                    return Err(ReceiverError::OversizedBlock { got: len });
                }
                Ok(CaptureRecord::BlockReady {
                    bit_flips,
                    block: self.take(len)?.to_vec(),
                })
            }
            TAG_RESOURCE_EXHAUSTED => Ok(CaptureRecord::ResourceExhausted),
            other => Err(ReceiverError::UnknownRecord(other)),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(ReceiverError::Truncated);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_sync_info(&mut self) -> Result<SyncInfo> {
        let cfo = self.take(4)?;
        let carrier_offset = f32::from_le_bytes([cfo[0], cfo[1], cfo[2], cfo[3]]);
        let mode = self.take(1)?[0];
        let mut call_sign = [0u8; CALL_SIGN_BYTES];
        call_sign.copy_from_slice(self.take(CALL_SIGN_BYTES)?);
        Ok(SyncInfo {
            carrier_offset,
            mode,
            call_sign,
        })
    }
}

/// Replays a parsed capture through the [`Demodulator`] interface, one
/// record per tick. The audio argument is ignored.
pub struct ReplayDemodulator {
    records: VecDeque<CaptureRecord>,
    cached: SyncInfo,
    pending: Option<(i32, Vec<u8>)>,
}

impl ReplayDemodulator {
    pub fn new(records: Vec<CaptureRecord>) -> Self {
        Self {
            records: records.into(),
            cached: SyncInfo {
                carrier_offset: 0.0,
                mode: 0,
                call_sign: [b' '; CALL_SIGN_BYTES],
            },
            pending: None,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self::new(CaptureReader::new(data)?.records()?))
    }

    pub fn is_exhausted(&self) -> bool {
        self.records.is_empty()
    }
}

impl Demodulator for ReplayDemodulator {
    fn process(&mut self, _audio: &[i16], _channel: ChannelSelect) -> DecodeEvent {
        match self.records.pop_front() {
            None => DecodeEvent::NoEvent,
            Some(CaptureRecord::PreambleFail) => DecodeEvent::PreambleFail,
            Some(CaptureRecord::WeakSync(info)) => {
                self.cached = info;
                DecodeEvent::WeakSync
            }
            Some(CaptureRecord::Synced(info)) => {
                self.cached = info;
                DecodeEvent::Synced
            }
            Some(CaptureRecord::BlockReady { bit_flips, block }) => {
                self.pending = Some((bit_flips, block));
                DecodeEvent::BlockReady
            }
            Some(CaptureRecord::ResourceExhausted) => DecodeEvent::ResourceExhausted,
        }
    }

    fn cached(&mut self) -> SyncInfo {
        self.cached
    }

    fn fetch(&mut self, block: &mut [u8]) -> i32 {
        match self.pending.take() {
            None => -1,
            Some((bit_flips, bytes)) => {
                let len = bytes.len().min(block.len());
                block[..len].copy_from_slice(&bytes[..len]);
                block[len..].fill(0);
                bit_flips
            }
        }
    }
}
