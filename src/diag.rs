//! Diagnostic sink.
//!
//! Every component receives an explicit [`Diag`] handle instead of writing
//! to a process-wide sink. The handle forwards to the `tracing` macros and
//! owns the state that diagnostics policy needs: once-per-file suppression
//! for unsupported link types and ignored ethertypes, and counters that the
//! reporting layer (and tests) can read back.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::trace::FileId;

/// Diagnostic handle passed to the ingest and decode components.
#[derive(Debug, Default)]
pub struct Diag {
    dropped_frames: u64,
    bad_timestamps: u64,
    file_errors: u64,
    esp_failures: u64,
    extension_header_drops: u64,
    link_types_seen: HashSet<(FileId, u16)>,
    ethertypes_seen: HashSet<(FileId, u16)>,
}

impl Diag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame left the pipeline without entering the trace.
    pub fn dropped_frame(&mut self, file: FileId, number: u32, reason: &str) {
        self.dropped_frames += 1;
        debug!(file = file.index(), frame = number, reason, "frame dropped");
    }

    /// A frame carried a timestamp outside the representable range.
    pub fn bad_timestamp(&mut self, file: FileId, number: u32, ticks: i64) {
        self.bad_timestamps += 1;
        self.dropped_frames += 1;
        warn!(
            file = file.index(),
            frame = number,
            ticks,
            "frame timestamp out of range, frame dropped"
        );
    }

    /// An individual file failed to open or read; ingest continues.
    pub fn file_error(&mut self, path: &Path, reason: &dyn std::fmt::Display) {
        self.file_errors += 1;
        warn!(path = %path.display(), %reason, "capture file skipped");
    }

    /// A link type the decoder does not handle. The frame is dropped;
    /// the warning is logged once per file.
    pub fn unsupported_link_type(&mut self, file: FileId, link_type: u16) {
        self.dropped_frames += 1;
        if self.link_types_seen.insert((file, link_type)) {
            warn!(
                file = file.index(),
                link_type, "unsupported link type, frames dropped"
            );
        }
    }

    /// A non-IP ethertype. Logged once per file.
    pub fn ignored_ethertype(&mut self, file: FileId, ethertype: u16) {
        if self.ethertypes_seen.insert((file, ethertype)) {
            debug!(
                file = file.index(),
                ethertype, "non-IP ethertype ignored"
            );
        }
    }

    /// The ESP trailer probe failed at both blob lengths.
    pub fn esp_trailer_failure(&mut self, file: FileId, number: u32) {
        self.esp_failures += 1;
        warn!(
            file = file.index(),
            frame = number,
            "ESP trailer not recognized, payload skipped"
        );
    }

    /// An IPv6 extension header the decoder does not walk.
    pub fn unsupported_extension_header(&mut self, file: FileId, number: u32, next_header: u8) {
        self.extension_header_drops += 1;
        self.dropped_frames += 1;
        warn!(
            file = file.index(),
            frame = number,
            next_header,
            "unsupported IPv6 extension header, frame dropped"
        );
    }

    /// Total frames dropped before entering the trace.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Frames dropped for out-of-range timestamps.
    pub fn bad_timestamps(&self) -> u64 {
        self.bad_timestamps
    }

    /// Files skipped for open/read errors.
    pub fn file_errors(&self) -> u64 {
        self.file_errors
    }

    /// ESP trailer probes that failed at both blob lengths.
    pub fn esp_failures(&self) -> u64 {
        self.esp_failures
    }

    /// Frames dropped for unwalked IPv6 extension headers.
    pub fn extension_header_drops(&self) -> u64 {
        self.extension_header_drops
    }
}
