//! Seams for the collaborators the compositor core depends on but does not implement: the
//! asynchronous VRAM transfer queue and the block decompression codecs

use thiserror::Error;

/// Where a transfer lands. Offsets are relative to the start of the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDestination {
    BgVram(u32),
    BgPalette(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest<'a> {
    pub source: &'a [u8],
    pub destination: TransferDestination,
    pub priority: u8,
}

pub trait VramTransfer {
    /// Queue a copy. Returns the slot ID of the queued transfer, or `None` if the queue is full.
    fn request_copy(&mut self, request: TransferRequest<'_>) -> Option<u8>;

    /// Whether the transfer in `slot` has completed and its slot can accept a new request.
    fn has_space(&self, slot: u8) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Lz77,
    RunLength,
}

/// Target memory class; word-addressed targets cannot take single byte writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressTarget {
    Linear,
    Word,
}

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("Invalid compression header byte; expected {expected:02X}, was {actual:02X}")]
    InvalidHeader { expected: u8, actual: u8 },
    #[error("Back-reference at output position {position} points {distance} bytes back")]
    BackReferenceUnderflow { position: usize, distance: usize },
    #[error("Compressed stream ended unexpectedly at byte {position}")]
    UnexpectedEnd { position: usize },
}

pub trait Decompressor {
    /// Decompress `source` into `dest`, returning the number of bytes written.
    ///
    /// Output that would overflow `dest` is truncated (and logged) for linear targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the compressed stream is malformed.
    fn decompress(
        &mut self,
        format: CompressionFormat,
        target: DecompressTarget,
        source: &[u8],
        dest: &mut [u8],
    ) -> Result<usize, DecompressError>;
}
