use crate::CALL_SIGN_BYTES;

/// Outcome of feeding one audio block to the demodulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeEvent {
    /// Nothing of interest in this block.
    NoEvent,
    /// Preamble correlation failed.
    PreambleFail,
    /// Preamble found but the metadata decode was a ping or unusable.
    WeakSync,
    /// Timing/frequency/preamble acquired; cached metadata is fresh.
    Synced,
    /// A full symbol block has been demodulated and can be fetched.
    BlockReady,
    /// The demodulator ran out of working memory.
    ResourceExhausted,
}

/// Input channel routing for multi-channel capture hardware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelSelect {
    #[default]
    Default,
    First,
    Second,
    Summation,
    Analytic,
}

/// Synchronization metadata cached by the demodulator at lock time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncInfo {
    pub carrier_offset: f32,
    pub mode: u8,
    pub call_sign: [u8; CALL_SIGN_BYTES],
}

impl SyncInfo {
    /// Mode 0 is a ping: a bare preamble with no payload following.
    pub fn is_ping(&self) -> bool {
        self.mode == 0
    }

    /// Call sign with field padding trimmed.
    pub fn call_sign_str(&self) -> String {
        String::from_utf8_lossy(&self.call_sign)
            .trim_matches(|c: char| c == ' ' || c == '\0')
            .to_string()
    }
}

/// Physical-layer demodulator boundary.
///
/// One `process` call per periodic audio block; `cached` and `fetch` are
/// only meaningful right after the events that refresh them (`Synced` /
/// `WeakSync` and `BlockReady` respectively).
pub trait Demodulator {
    /// Consume one audio block and report what, if anything, happened.
    fn process(&mut self, audio: &[i16], channel: ChannelSelect) -> DecodeEvent;

    /// Synchronization metadata from the most recent preamble decode.
    fn cached(&mut self) -> SyncInfo;

    /// Copy the decoded block into `block` and return the number of bit
    /// flips the error correction had to perform; negative means the
    /// decode failed.
    fn fetch(&mut self, block: &mut [u8]) -> i32;
}
