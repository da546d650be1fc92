//! Still-image receiver core for an audio-modem transfer protocol
//!
//! Consumes per-block decode events from an external OFDM demodulator,
//! reassembles erasure-coded chunk transfers and releases checksum-validated
//! image payloads to the caller.

pub mod chunkset;
pub mod coder;
pub mod controller;
pub mod demod;
pub mod error;
pub mod header;
pub mod replay;
pub mod sniff;

pub use chunkset::{AdmitResult, ChunkSet};
pub use coder::{crc32, ErasureCoder, SystematicCoder};
pub use controller::{ReassemblyController, ReceivedImage, State, Status};
pub use demod::{ChannelSelect, DecodeEvent, Demodulator, SyncInfo};
pub use error::{ReceiverError, Result};
pub use header::ChunkHeader;
pub use sniff::{ImageFormat, ImageInfo};

// Block/transfer configuration
pub const MAX_BLOCK_BYTES: usize = 5380;
pub const CHUNK_HEADER_BYTES: usize = 14;
pub const MAX_BLOCK_COUNT: usize = 12;
pub const MAX_PAYLOAD_BYTES: usize = (MAX_BLOCK_BYTES - CHUNK_HEADER_BYTES) * MAX_BLOCK_COUNT;

// Demodulator metadata
pub const CALL_SIGN_BYTES: usize = 9;

// Accepted image dimensions
pub const MIN_IMAGE_DIM: u32 = 16;
pub const MAX_IMAGE_DIM: u32 = 1024;
