//! Capture-file readers.
//!
//! Four on-disk families are unified behind one frame iterator: Microsoft
//! NetMon 2.x, classic pcap (four byte-order/resolution variants), pcap-ng,
//! and Event Trace Logs. The first three are detected by the leading
//! four-byte magic read as a little-endian u32; ETL files carry no magic and
//! are matched on their extension.
//!
//! Each reader owns its file handle and releases it on drop. Readers yield
//! [`RawFrame`] records in file order with timestamps already converted to
//! ticks; range validation happens in the ingest loop so a bad timestamp
//! drops only the affected frame.

mod etl;
mod netmon;
mod pcap;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytes::Bytes;

pub use etl::EtlReader;
pub use netmon::NetMonReader;
pub use pcap::PcapReader;

use crate::error::{CaptureError, Error, Result};

/// Leading magic values, read as a little-endian u32.
pub mod magic {
    /// NetMon 2.x ("GMBU").
    pub const NETMON: u32 = 0x5542_4D47;
    /// Classic pcap, native byte order, microsecond resolution.
    pub const PCAP_MICRO: u32 = 0xA1B2_C3D4;
    /// Classic pcap, swapped byte order, microsecond resolution.
    pub const PCAP_MICRO_SWAPPED: u32 = 0xD4C3_B2A1;
    /// Classic pcap, native byte order, nanosecond resolution.
    pub const PCAP_NANO: u32 = 0xA1B2_3C4D;
    /// Classic pcap, swapped byte order, nanosecond resolution.
    pub const PCAP_NANO_SWAPPED: u32 = 0x4D3C_B2A1;
    /// pcap-ng section header block.
    pub const PCAPNG: u32 = 0x0A0D_0D0A;
}

/// Capture-file format, as selected by the magic table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    NetMon,
    Pcap,
    PcapNg,
    Etl,
}

impl CaptureFormat {
    /// Sniff the format of a file.
    ///
    /// Reads the first four bytes as a little-endian u32 and consults the
    /// magic table; falls back to the `.etl` extension (case-insensitive),
    /// which has no magic. Anything else is `UnsupportedFormat`.
    pub fn detect(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| file_access(path, &e))?;
        let mut header = [0u8; 4];
        file.read_exact(&mut header)
            .map_err(|e| file_access(path, &e))?;
        let magic = u32::from_le_bytes(header);

        match magic {
            magic::NETMON => Ok(CaptureFormat::NetMon),
            magic::PCAP_MICRO
            | magic::PCAP_MICRO_SWAPPED
            | magic::PCAP_NANO
            | magic::PCAP_NANO_SWAPPED => Ok(CaptureFormat::Pcap),
            magic::PCAPNG => Ok(CaptureFormat::PcapNg),
            _ if has_etl_extension(path) => Ok(CaptureFormat::Etl),
            _ => Err(Error::Capture(CaptureError::UnsupportedFormat {
                path: path.display().to_string(),
                magic,
            })),
        }
    }
}

fn has_etl_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("etl"))
}

pub(crate) fn file_access(path: &Path, reason: &dyn std::fmt::Display) -> Error {
    Error::Capture(CaptureError::FileAccess {
        path: path.display().to_string(),
        reason: reason.to_string(),
    })
}

/// One frame as yielded by a capture reader.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame number from the source (1-based).
    pub number: u32,
    /// Timestamp converted to ticks; validated by the caller.
    pub ticks: i64,
    /// Link type (e.g. 1 = Ethernet).
    pub link_type: u16,
    /// Length of the frame on the wire.
    pub frame_length: u32,
    /// Bytes present in `data`.
    pub captured_length: u32,
    /// Raw frame bytes, `captured_length` long.
    pub data: Bytes,
}

/// Uniform frame iterator over the concrete readers.
pub enum CaptureReader {
    Pcap(PcapReader),
    NetMon(NetMonReader),
    Etl(EtlReader),
}

impl CaptureReader {
    /// Sniff the format and open the matching reader.
    pub fn open(path: &Path) -> Result<Self> {
        match CaptureFormat::detect(path)? {
            CaptureFormat::Pcap | CaptureFormat::PcapNg => {
                Ok(CaptureReader::Pcap(PcapReader::open(path)?))
            }
            CaptureFormat::NetMon => Ok(CaptureReader::NetMon(NetMonReader::open(path)?)),
            CaptureFormat::Etl => Ok(CaptureReader::Etl(EtlReader::open(path)?)),
        }
    }

    /// Read the next frame. Returns `Ok(None)` at end of file.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        match self {
            CaptureReader::Pcap(r) => r.next_frame(),
            CaptureReader::NetMon(r) => r.next_frame(),
            CaptureReader::Etl(r) => r.next_frame(),
        }
    }
}
