//! Event Trace Log capture reader.
//!
//! ETL files have no leading magic; they are selected by extension. The
//! file is a run of fixed-header WMI buffers, each holding 8-byte-aligned
//! event records. Only NDIS packet-fragment events (matched by provider
//! GUID) yield frames; everything else in the log is skipped.
//!
//! ```text
//! buffer:  size u32 | saved offset u32 | 64 reserved bytes | events...
//! event:   size u16 | type u8 | flags u8 | event id u16 | version u16
//!          | timestamp i64 (FILETIME) | provider GUID (16 bytes) | payload
//! ndis:    miniport index u32 | lower index u32 | fragment size u32
//!          | fragment bytes
//! ```
//!
//! All integers are little-endian; event timestamps are FILETIME values
//! converted to ticks on the way out.

use std::path::Path;

use bytes::Bytes;
use tracing::trace;

use super::{file_access, RawFrame};
use crate::error::{CaptureError, Error, Result};
use crate::ticks;

/// WMI buffer header length.
const BUFFER_HEADER_LEN: usize = 72;

/// Fixed event-record header length.
const EVENT_HEADER_LEN: usize = 32;

/// NDIS fragment payload prefix (miniport, lower index, fragment size).
const NDIS_PREFIX_LEN: usize = 12;

/// Provider GUID of NDIS packet-capture fragment events,
/// {2ED6006E-4729-4609-B423-3EE7BCD678EF} in on-disk byte order.
pub const NDIS_PROVIDER_GUID: [u8; 16] = [
    0x6E, 0x00, 0xD6, 0x2E, 0x29, 0x47, 0x09, 0x46, 0xB4, 0x23, 0x3E, 0xE7, 0xBC, 0xD6, 0x78,
    0xEF,
];

/// Reader for Event Trace Log files.
pub struct EtlReader {
    data: Vec<u8>,
    path: String,
    /// Start of the current buffer.
    buffer_start: usize,
    /// End of valid event data in the current buffer.
    buffer_end: usize,
    /// Cursor within the current buffer.
    cursor: usize,
    frame_number: u32,
}

impl EtlReader {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| file_access(path, &e))?;
        let mut reader = EtlReader {
            data,
            path: path.display().to_string(),
            buffer_start: 0,
            buffer_end: 0,
            cursor: 0,
            frame_number: 0,
        };
        reader.enter_buffer(0)?;
        Ok(reader)
    }

    /// Read the next NDIS fragment frame. Returns `Ok(None)` at end of log.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            if self.cursor + EVENT_HEADER_LEN > self.buffer_end {
                if !self.advance_buffer()? {
                    return Ok(None);
                }
                continue;
            }

            let event_start = self.cursor;
            let size = read_u16(&self.data, event_start) as usize;
            if size < EVENT_HEADER_LEN || event_start + size > self.buffer_end {
                return Err(self.invalid("event record out of bounds"));
            }
            // Records are padded to 8-byte multiples within the buffer.
            self.cursor = event_start + ((size + 7) & !7);

            if self.data[event_start + 16..event_start + 32] != NDIS_PROVIDER_GUID {
                trace!(path = %self.path, "skipping non-NDIS event");
                continue;
            }
            if size < EVENT_HEADER_LEN + NDIS_PREFIX_LEN {
                return Err(self.invalid("NDIS event too short"));
            }

            let filetime = read_i64(&self.data, event_start + 8);
            let payload_start = event_start + EVENT_HEADER_LEN;
            let fragment_size = read_u32(&self.data, payload_start + 8) as usize;
            let fragment_start = payload_start + NDIS_PREFIX_LEN;
            if fragment_start + fragment_size > event_start + size {
                return Err(self.invalid("NDIS fragment out of bounds"));
            }

            self.frame_number += 1;
            return Ok(Some(RawFrame {
                number: self.frame_number,
                ticks: ticks::from_filetime(filetime),
                // NDIS fragments are Ethernet frames.
                link_type: 1,
                frame_length: fragment_size as u32,
                captured_length: fragment_size as u32,
                data: Bytes::copy_from_slice(
                    &self.data[fragment_start..fragment_start + fragment_size],
                ),
            }));
        }
    }

    /// Position on the buffer at `offset`; empty files are allowed.
    fn enter_buffer(&mut self, offset: usize) -> Result<()> {
        if offset >= self.data.len() {
            self.buffer_start = self.data.len();
            self.buffer_end = self.data.len();
            self.cursor = self.data.len();
            return Ok(());
        }
        if offset + BUFFER_HEADER_LEN > self.data.len() {
            return Err(self.invalid("buffer header truncated"));
        }
        let size = read_u32(&self.data, offset) as usize;
        let saved_offset = read_u32(&self.data, offset + 4) as usize;
        if size < BUFFER_HEADER_LEN || offset + size > self.data.len() || saved_offset > size {
            return Err(self.invalid("buffer geometry out of bounds"));
        }
        self.buffer_start = offset;
        self.buffer_end = offset + saved_offset.max(BUFFER_HEADER_LEN);
        self.cursor = offset + BUFFER_HEADER_LEN;
        Ok(())
    }

    /// Move to the next buffer; false at end of file.
    fn advance_buffer(&mut self) -> Result<bool> {
        if self.buffer_start >= self.data.len() {
            return Ok(false);
        }
        let size = read_u32(&self.data, self.buffer_start) as usize;
        let next = self.buffer_start + size;
        self.enter_buffer(next)?;
        Ok(next < self.data.len())
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::Capture(CaptureError::InvalidFormat {
            path: self.path.clone(),
            reason: reason.to_string(),
        })
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_i64(data: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    i64::from_le_bytes(bytes)
}
