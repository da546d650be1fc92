use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("capture magic mismatch")]
    BadMagic,

    #[error("unsupported capture version {0}")]
    BadVersion(u8),

    #[error("truncated capture record")]
    Truncated,

    #[error("unknown capture record tag {0:#04x}")]
    UnknownRecord(u8),

    #[error("block exceeds maximum size: {got} bytes")]
    OversizedBlock { got: usize },
}

pub type Result<T> = std::result::Result<T, ReceiverError>;
