//! Classic pcap and pcap-ng reader.
//!
//! Both formats are parsed with `pcap_parser`, behind an enum chosen from
//! the leading magic. Classic pcap carries one timestamp resolution per
//! file (microseconds or nanoseconds, signalled by the magic); pcap-ng
//! enhanced-packet timestamps are taken in the default microsecond
//! resolution.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use bytes::Bytes;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapNGReader};

use super::{file_access, magic, RawFrame};
use crate::error::{CaptureError, Error, Result};
use crate::ticks;

/// Buffer size for pcap_parser readers (64KB).
const BUFFER_SIZE: usize = 65536;

/// Reader for classic pcap and pcap-ng files.
pub struct PcapReader {
    inner: ReaderInner,
    frame_number: u32,
    link_type: u16,
    /// Classic pcap only: timestamp fraction is nanoseconds.
    nanosecond: bool,
    path: String,
}

enum ReaderInner {
    Legacy(LegacyPcapReader<BufReader<File>>),
    Ng(PcapNGReader<BufReader<File>>),
}

impl PcapReader {
    /// Open a pcap or pcap-ng file; the variant is chosen from the magic.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| file_access(path, &e))?;
        let reader = BufReader::with_capacity(BUFFER_SIZE, file);

        let leading = {
            let mut probe = File::open(path).map_err(|e| file_access(path, &e))?;
            let mut bytes = [0u8; 4];
            std::io::Read::read_exact(&mut probe, &mut bytes)
                .map_err(|e| file_access(path, &e))?;
            u32::from_le_bytes(bytes)
        };

        let inner = if leading == magic::PCAPNG {
            let ng = PcapNGReader::new(BUFFER_SIZE, reader)
                .map_err(|e| invalid(path, &format!("failed to parse pcap-ng header: {e}")))?;
            ReaderInner::Ng(ng)
        } else {
            let legacy = LegacyPcapReader::new(BUFFER_SIZE, reader)
                .map_err(|e| invalid(path, &format!("failed to parse pcap header: {e}")))?;
            ReaderInner::Legacy(legacy)
        };

        Ok(PcapReader {
            inner,
            frame_number: 0,
            link_type: 1,
            nanosecond: matches!(leading, magic::PCAP_NANO | magic::PCAP_NANO_SWAPPED),
            path: path.display().to_string(),
        })
    }

    /// Link type of the capture (e.g. 1 = Ethernet).
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Read the next frame. Returns `Ok(None)` at end of file.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if matches!(self.inner, ReaderInner::Legacy(_)) {
            self.next_legacy()
        } else {
            self.next_ng()
        }
    }

    fn next_legacy(&mut self) -> Result<Option<RawFrame>> {
        use pcap_parser::PcapError as ParserError;

        let reader = match &mut self.inner {
            ReaderInner::Legacy(r) => r,
            ReaderInner::Ng(_) => unreachable!(),
        };

        loop {
            match reader.next() {
                Ok((offset, block)) => match block {
                    PcapBlockOwned::Legacy(packet) => {
                        self.frame_number += 1;

                        let ticks = if self.nanosecond {
                            ticks::from_unix_nanos(packet.ts_sec as i64, packet.ts_usec as i64)
                        } else {
                            ticks::from_unix_micros(packet.ts_sec as i64, packet.ts_usec as i64)
                        };

                        let frame = RawFrame {
                            number: self.frame_number,
                            ticks,
                            link_type: self.link_type,
                            frame_length: packet.origlen,
                            captured_length: packet.caplen,
                            data: Bytes::copy_from_slice(packet.data),
                        };

                        reader.consume(offset);
                        return Ok(Some(frame));
                    }
                    PcapBlockOwned::LegacyHeader(header) => {
                        self.link_type = header.network.0 as u16;
                        reader.consume(offset);
                        continue;
                    }
                    _ => {
                        reader.consume(offset);
                        continue;
                    }
                },
                Err(ParserError::Eof) => return Ok(None),
                Err(ParserError::Incomplete(_)) => {
                    reader.refill().map_err(|e| {
                        invalid_str(&self.path, &format!("pcap refill error: {e}"))
                    })?;
                    continue;
                }
                Err(e) => {
                    return Err(invalid_str(&self.path, &format!("pcap parse error: {e}")));
                }
            }
        }
    }

    fn next_ng(&mut self) -> Result<Option<RawFrame>> {
        use pcap_parser::PcapError as ParserError;

        let reader = match &mut self.inner {
            ReaderInner::Ng(r) => r,
            ReaderInner::Legacy(_) => unreachable!(),
        };

        loop {
            match reader.next() {
                Ok((offset, block)) => match block {
                    PcapBlockOwned::NG(ng_block) => {
                        use pcap_parser::pcapng::Block;

                        match ng_block {
                            Block::InterfaceDescription(idb) => {
                                self.link_type = idb.linktype.0 as u16;
                                reader.consume(offset);
                                continue;
                            }
                            Block::EnhancedPacket(epb) => {
                                self.frame_number += 1;

                                let micros = ((epb.ts_high as i64) << 32) | (epb.ts_low as i64);
                                let frame = RawFrame {
                                    number: self.frame_number,
                                    ticks: ticks::from_unix_micros(0, micros),
                                    link_type: self.link_type,
                                    frame_length: epb.origlen,
                                    captured_length: epb.caplen,
                                    data: Bytes::copy_from_slice(epb.data),
                                };

                                reader.consume(offset);
                                return Ok(Some(frame));
                            }
                            Block::SimplePacket(spb) => {
                                self.frame_number += 1;

                                // Simple packet blocks carry no timestamp;
                                // the ingest loop drops these as bad.
                                let frame = RawFrame {
                                    number: self.frame_number,
                                    ticks: -1,
                                    link_type: self.link_type,
                                    frame_length: spb.origlen,
                                    captured_length: spb.data.len() as u32,
                                    data: Bytes::copy_from_slice(spb.data),
                                };

                                reader.consume(offset);
                                return Ok(Some(frame));
                            }
                            _ => {
                                reader.consume(offset);
                                continue;
                            }
                        }
                    }
                    _ => {
                        reader.consume(offset);
                        continue;
                    }
                },
                Err(ParserError::Eof) => return Ok(None),
                Err(ParserError::Incomplete(_)) => {
                    reader.refill().map_err(|e| {
                        invalid_str(&self.path, &format!("pcap-ng refill error: {e}"))
                    })?;
                    continue;
                }
                Err(e) => {
                    return Err(invalid_str(&self.path, &format!("pcap-ng parse error: {e}")));
                }
            }
        }
    }
}

fn invalid(path: &Path, reason: &str) -> Error {
    invalid_str(&path.display().to_string(), reason)
}

fn invalid_str(path: &str, reason: &str) -> Error {
    Error::Capture(CaptureError::InvalidFormat {
        path: path.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Build a classic little-endian microsecond pcap with the given frames.
    pub(crate) fn build_pcap(frames: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0xA1B2_C3D4u32.to_le_bytes()); // magic
        data.extend_from_slice(&2u16.to_le_bytes()); // version major
        data.extend_from_slice(&4u16.to_le_bytes()); // version minor
        data.extend_from_slice(&0u32.to_le_bytes()); // thiszone
        data.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
        data.extend_from_slice(&65535u32.to_le_bytes()); // snaplen
        data.extend_from_slice(&1u32.to_le_bytes()); // network: Ethernet

        for (ts_sec, ts_usec, packet) in frames {
            data.extend_from_slice(&ts_sec.to_le_bytes());
            data.extend_from_slice(&ts_usec.to_le_bytes());
            data.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            data.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            data.extend_from_slice(packet);
        }
        data
    }

    #[test]
    fn test_read_legacy_pcap() {
        let payload = [0u8; 14];
        let bytes = build_pcap(&[(1_000, 500, &payload), (1_001, 0, &payload)]);
        let temp = NamedTempFile::with_suffix(".pcap").unwrap();
        std::fs::File::create(temp.path())
            .unwrap()
            .write_all(&bytes)
            .unwrap();

        let mut reader = PcapReader::open(temp.path()).unwrap();
        let first = reader.next_frame().unwrap().unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(first.ticks, ticks::from_unix_micros(1_000, 500));
        assert_eq!(first.link_type, 1);
        assert_eq!(first.captured_length, 14);

        let second = reader.next_frame().unwrap().unwrap();
        assert_eq!(second.number, 2);
        assert!(second.ticks > first.ticks);

        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_nanosecond_variant_scales_fraction() {
        let payload = [0u8; 14];
        let mut bytes = build_pcap(&[(1_000, 150, &payload)]);
        // Rewrite the magic to the nanosecond variant; the fraction field
        // is then nanoseconds and divides by 100 instead of multiplying.
        bytes[0..4].copy_from_slice(&0xA1B2_3C4Du32.to_le_bytes());

        let temp = NamedTempFile::with_suffix(".pcap").unwrap();
        std::fs::File::create(temp.path())
            .unwrap()
            .write_all(&bytes)
            .unwrap();

        let mut reader = PcapReader::open(temp.path()).unwrap();
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.ticks, ticks::from_unix_nanos(1_000, 150));
    }
}
