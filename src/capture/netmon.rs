//! Microsoft NetMon 2.x capture reader.
//!
//! A NetMon capture is a header, a blob of frame records, and a trailing
//! frame table of u32 offsets into that blob. The header carries the
//! capture start time as a SYSTEMTIME; each frame record stores its offset
//! from that start in microseconds:
//!
//! ```text
//! header:  magic "GMBU" | ver minor u8 | ver major u8 | mac type u16
//!          | SYSTEMTIME (8 x u16) | frame table offset u32 | length u32
//! frame:   time offset u64 (us) | frame length u32 | bytes available u32
//!          | raw bytes
//! ```
//!
//! All integers are little-endian. The whole file is loaded up front; the
//! frame table drives iteration, so records may appear in any physical
//! order.

use std::path::Path;

use bytes::Bytes;

use super::{file_access, magic, RawFrame};
use crate::error::{CaptureError, Error, Result};
use crate::ticks;

/// Fixed NetMon header region consumed by this reader.
const HEADER_LEN: usize = 32;

/// Per-frame record header: time offset, frame length, bytes available.
const FRAME_HEADER_LEN: usize = 16;

/// Reader for NetMon 2.x capture files.
pub struct NetMonReader {
    data: Vec<u8>,
    path: String,
    link_type: u16,
    /// Capture start in ticks; `None` when the header SYSTEMTIME is
    /// unparseable, in which case every frame reports an invalid tick and
    /// the ingest loop drops it with a diagnostic.
    start_ticks: Option<i64>,
    table: Vec<u32>,
    next_index: usize,
}

impl NetMonReader {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| file_access(path, &e))?;
        let path_str = path.display().to_string();

        if data.len() < HEADER_LEN {
            return Err(invalid(&path_str, "header truncated"));
        }
        if read_u32(&data, 0) != magic::NETMON {
            return Err(invalid(&path_str, "bad NetMon signature"));
        }

        let link_type = read_u16(&data, 6);
        let start_ticks = ticks::from_systemtime_parts(
            read_u16(&data, 8),  // year
            read_u16(&data, 10), // month
            // offset 12 is day-of-week, unused
            read_u16(&data, 14), // day
            read_u16(&data, 16), // hour
            read_u16(&data, 18), // minute
            read_u16(&data, 20), // second
            read_u16(&data, 22), // milliseconds
        );

        let table_offset = read_u32(&data, 24) as usize;
        let table_length = read_u32(&data, 28) as usize;
        let table_end = table_offset
            .checked_add(table_length)
            .filter(|&end| end <= data.len() && table_length % 4 == 0)
            .ok_or_else(|| invalid(&path_str, "frame table out of bounds"))?;

        let table = data[table_offset..table_end]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(NetMonReader {
            data,
            path: path_str,
            link_type,
            start_ticks,
            table,
            next_index: 0,
        })
    }

    /// Link type of the capture (the header's mac type).
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Read the next frame. Returns `Ok(None)` past the frame table.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(&offset) = self.table.get(self.next_index) else {
            return Ok(None);
        };
        self.next_index += 1;
        let number = self.next_index as u32;
        let offset = offset as usize;

        if offset + FRAME_HEADER_LEN > self.data.len() {
            return Err(invalid(&self.path, "frame record out of bounds"));
        }

        let time_offset_us = read_u64(&self.data, offset);
        let frame_length = read_u32(&self.data, offset + 8);
        let captured_length = read_u32(&self.data, offset + 12);

        let data_start = offset + FRAME_HEADER_LEN;
        let data_end = data_start + captured_length as usize;
        if data_end > self.data.len() {
            return Err(invalid(&self.path, "frame bytes out of bounds"));
        }

        let ticks = match self.start_ticks {
            Some(start) => start.wrapping_add(
                (time_offset_us as i64).wrapping_mul(ticks::TICKS_PER_MICROSECOND),
            ),
            None => -1,
        };

        Ok(Some(RawFrame {
            number,
            ticks,
            link_type: self.link_type,
            frame_length,
            captured_length,
            data: Bytes::copy_from_slice(&self.data[data_start..data_end]),
        }))
    }
}

fn invalid(path: &str, reason: &str) -> Error {
    Error::Capture(CaptureError::InvalidFormat {
        path: path.to_string(),
        reason: reason.to_string(),
    })
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

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}
