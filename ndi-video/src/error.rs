//! Error types for every pipeline stage

use crate::types::PixelFormat;
use thiserror::Error;

/// Buffer geometry that cannot be laid out in memory
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("invalid buffer geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("buffer layout overflows the address space")]
    Overflow,

    #[error("expected {expected} planes, got {actual}")]
    PlaneCount { expected: usize, actual: usize },

    #[error("plane {plane} has a null base address")]
    NullPlane { plane: usize },

    #[error("plane {plane} row stride {bytes_per_row} is shorter than {min} bytes")]
    StrideTooSmall {
        plane: usize,
        bytes_per_row: usize,
        min: usize,
    },
}

/// Compositor failure while copying between two buffers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("source format {source_format} does not match destination {destination}")]
    FormatMismatch {
        source_format: PixelFormat,
        destination: PixelFormat,
    },

    #[error("plane {plane} geometry differs between source and destination")]
    GeometryMismatch { plane: usize },

    #[error("plane {plane} is not addressable")]
    PlaneUnavailable { plane: usize },
}

/// Frame Normalizer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("unsupported input pixel format {actual} (expected {expected})")]
    UnsupportedFormat {
        actual: PixelFormat,
        expected: PixelFormat,
    },

    #[error("input buffer could not be locked for reading")]
    InputUnavailable,

    #[error("output buffer pool is unavailable: {0}")]
    PoolUnavailable(LayoutError),

    #[error("failed to allocate output buffer: {reason}")]
    AllocationFailed { reason: String },
}

/// Frame Transmitter errors
///
/// Per-frame send failures from the engine are deliberately absent; they
/// are counted in [`crate::TransmitStats`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransmitError {
    #[error("send engine is not initialized")]
    NotInitialized,

    #[error("a sender channel is already created")]
    AlreadyCreated,

    #[error("channel name {name:?} cannot be encoded for the wire")]
    InvalidName { name: String },

    #[error("send engine refused to create channel {name:?}")]
    CreateFailed { name: String },

    #[error("no sender channel is open")]
    NoChannel,

    #[error("invalid pixel format {actual} (expected {expected})")]
    InvalidFormat {
        expected: PixelFormat,
        actual: PixelFormat,
    },

    #[error("failed to get base address of plane 0")]
    AddressUnavailable,
}

/// Reason a broadcast session ended early
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("failed to create NDI sender: {0}")]
    Start(TransmitError),

    #[error("failed to duplicate sample buffer: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("failed to send sample buffer: {0}")]
    Transmit(#[from] TransmitError),
}
