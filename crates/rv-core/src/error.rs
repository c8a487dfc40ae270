//! Error types for Reverie

use thiserror::Error;

/// Core error type
///
/// Variants raised from the audio thread carry only plain integers so that
/// constructing them never allocates.
#[derive(Error, Debug)]
pub enum RvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Allocation of {requested} samples failed")]
    Allocation { requested: usize },

    #[error("Channel {channel} out of range (have {channels})")]
    ChannelOutOfRange { channel: usize, channels: usize },

    #[error("Span of {len} samples at {start} exceeds capacity {capacity}")]
    SpanOutOfRange {
        start: usize,
        len: usize,
        capacity: usize,
    },

    #[error("Engine not prepared")]
    NotPrepared,
}

/// Result type alias
pub type RvResult<T> = Result<T, RvError>;
