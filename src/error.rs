//! Error types for sqltrace-core.
//!
//! Two layers of structured errors, wrapped by a single crate-wide
//! [`enum@Error`]:
//!
//! - [`CaptureError`] - errors while opening or reading capture files
//! - [`DecodeError`] - errors while decoding frame contents
//!
//! Per-frame decode errors are contained by the ingest loop (the frame is
//! dropped or the owning conversation's truncation counter is bumped);
//! per-file capture errors are logged and ingest continues with the
//! remaining files. Neither class ever aborts the trace as a whole.

use thiserror::Error;

/// Main error type for sqltrace-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error opening or reading a capture file
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Error decoding a frame
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to capture-file access and framing.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Leading magic matches no known capture format
    #[error("unsupported capture format in {path}: magic {magic:#010x}")]
    UnsupportedFormat { path: String, magic: u32 },

    /// Open or read failure on an individual file
    #[error("cannot access {path}: {reason}")]
    FileAccess { path: String, reason: String },

    /// Frame timestamp outside the representable date range
    #[error("frame {frame} timestamp out of range: {ticks} ticks")]
    BadTimestamp { frame: u32, ticks: i64 },

    /// Recognized format but internally malformed
    #[error("invalid capture file {path}: {reason}")]
    InvalidFormat { path: String, reason: String },
}

/// Errors related to decoding frame contents.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A header field indexes past the captured bytes
    #[error("{layer}: frame truncated (need byte {needed}, have {have})")]
    Truncated {
        layer: &'static str,
        needed: usize,
        have: usize,
    },

    /// ESP trailer probe failed at both integrity-blob lengths
    #[error("ESP trailer not recognized at either probe length")]
    EspUnknown,

    /// Link type the decoder does not handle
    #[error("unsupported link type {link_type:#06x}")]
    UnsupportedLinkType { link_type: u16 },

    /// IPv6 extension header the decoder does not walk
    #[error("unsupported IPv6 extension header {next_header}")]
    UnsupportedExtensionHeader { next_header: u8 },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
