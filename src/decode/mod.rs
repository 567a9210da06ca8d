//! Frame decoding.
//!
//! One pass per frame: link layer (Ethernet, VLAN stripping), network layer
//! (IPv4/IPv6 with ESP/AH unwrapping), transport layer (TCP with optional
//! SMP shim, or UDP). The transport decoders attach the frame to its
//! conversation; this module then applies the link-level conversation
//! updates (MACs, tick window, per-direction counters) and appends the
//! frame to the trace.
//!
//! Every header read goes through a checked accessor that reports
//! [`DecodeError::Truncated`] instead of panicking; the dispatch below
//! contains that error per the engine's policy (counter bump when a
//! conversation owns the frame, dropped frame otherwise).

pub mod ethernet;
pub mod ipsec;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod udp;

use std::net::IpAddr;

use crate::config::EngineConfig;
use crate::diag::Diag;
use crate::error::DecodeError;
use crate::trace::{Frame, FrameId, TraceStore};

/// IP next-protocol numbers the decoders dispatch on.
pub mod protocol {
    /// Placeholder meaning "skip this frame".
    pub const NONE: u8 = 0;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    /// IPv6 encapsulated in IPv4 (6in4).
    pub const IPV6_ENCAP: u8 = 41;
    pub const ESP: u8 = 50;
    pub const AH: u8 = 51;
}

/// Decoded network-layer summary handed to the transport decoders.
#[derive(Debug, Clone, Copy)]
pub struct NetworkHeader {
    pub source_ip: IpAddr,
    pub dest_ip: IpAddr,
    /// Final next-protocol after ESP/AH/6in4 unwrapping.
    pub protocol: u8,
    /// Bytes from the IP header start to the transport header, including
    /// unwrapped encapsulation headers.
    pub header_length: usize,
    /// Index of the final valid byte as bounded by the IP payload length
    /// (clamped to the captured bytes by the transport decoders).
    pub last_byte_offset: usize,
}

/// Decode one frame and append it to the trace.
///
/// Returns `None` when the frame was dropped; all diagnostics are emitted
/// through `diag`.
pub(crate) fn decode_frame(
    store: &mut TraceStore,
    config: &EngineConfig,
    diag: &mut Diag,
    mut frame: Frame,
    data: &[u8],
) -> Option<FrameId> {
    if frame.link_type != ethernet::LINKTYPE_ETHERNET {
        // WiFi and NetEvent are recognized but unsupported; anything else
        // is unknown. Either way the frame is dropped, once-per-file noise.
        diag.unsupported_link_type(frame.file, frame.link_type);
        return None;
    }

    let link = match ethernet::decode(data) {
        Ok(link) => link,
        Err(_) => {
            diag.dropped_frame(frame.file, frame.number, "link header truncated");
            return None;
        }
    };

    let result = decode_network(store, config, diag, &mut frame, data, &link);

    match result {
        Ok(()) => {}
        Err(DecodeError::Truncated { .. }) => {
            // Contained: a frame that indexes past its captured bytes stays
            // in the trace when a conversation already owns it.
            match frame.conversation {
                Some(conv) => store.conversation_mut(conv).truncation_error_count += 1,
                None => {
                    diag.dropped_frame(frame.file, frame.number, "truncated before attach");
                    return None;
                }
            }
        }
        Err(DecodeError::UnsupportedExtensionHeader { next_header }) => {
            diag.unsupported_extension_header(frame.file, frame.number, next_header);
            return None;
        }
        Err(_) => {
            diag.dropped_frame(frame.file, frame.number, "undecodable network payload");
            return None;
        }
    }

    let Some(conv_id) = frame.conversation else {
        diag.dropped_frame(frame.file, frame.number, "no TCP/UDP conversation");
        return None;
    };

    // Link-level conversation updates run after a successful IP dispatch.
    let conv = store.conversation_mut(conv_id);
    if conv.source_mac == 0 && conv.dest_mac == 0 {
        if frame.is_from_client {
            conv.source_mac = link.source_mac;
            conv.dest_mac = link.dest_mac;
        } else {
            conv.source_mac = link.dest_mac;
            conv.dest_mac = link.source_mac;
        }
    }
    if frame.ticks < conv.start_ticks {
        conv.start_ticks = frame.ticks;
    }
    if frame.ticks > conv.end_ticks {
        conv.end_ticks = frame.ticks;
    }
    if frame.is_from_client {
        conv.source_frames += 1;
    } else {
        conv.dest_frames += 1;
    }
    conv.total_bytes += frame.frame_length as u64;
    if frame.is_truncated() && conv.truncated_frame_length == 0 {
        conv.truncated_frame_length = frame.captured_length;
    }

    Some(store.push_frame(frame))
}

fn decode_network(
    store: &mut TraceStore,
    config: &EngineConfig,
    diag: &mut Diag,
    frame: &mut Frame,
    data: &[u8],
    link: &ethernet::LinkHeader,
) -> Result<(), DecodeError> {
    let net = match link.ethertype {
        ethernet::ethertype::IPV4 => ipv4::decode(data, link.payload_offset, diag, frame)?,
        ethernet::ethertype::IPV6 => ipv6::decode(data, link.payload_offset, diag, frame)?,
        other => {
            diag.ignored_ethertype(frame.file, other);
            return Ok(());
        }
    };

    let transport_offset = link.payload_offset + net.header_length;
    match net.protocol {
        protocol::TCP => tcp::decode(store, config, frame, data, &net, transport_offset),
        protocol::UDP => udp::decode(store, frame, data, &net, transport_offset),
        _ => Ok(()),
    }
}

/// Checked single-byte read.
#[inline]
pub(crate) fn byte_at(data: &[u8], offset: usize, layer: &'static str) -> Result<u8, DecodeError> {
    data.get(offset).copied().ok_or(DecodeError::Truncated {
        layer,
        needed: offset,
        have: data.len(),
    })
}

/// Checked big-endian u16 read.
#[inline]
pub(crate) fn be_u16(data: &[u8], offset: usize, layer: &'static str) -> Result<u16, DecodeError> {
    let hi = byte_at(data, offset, layer)?;
    let lo = byte_at(data, offset + 1, layer)?;
    Ok(u16::from_be_bytes([hi, lo]))
}

/// Checked big-endian u32 read.
#[inline]
pub(crate) fn be_u32(data: &[u8], offset: usize, layer: &'static str) -> Result<u32, DecodeError> {
    let mut bytes = [0u8; 4];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = byte_at(data, offset + i, layer)?;
    }
    Ok(u32::from_be_bytes(bytes))
}

/// Checked little-endian u16 read.
#[inline]
pub(crate) fn le_u16(data: &[u8], offset: usize, layer: &'static str) -> Result<u16, DecodeError> {
    let lo = byte_at(data, offset, layer)?;
    let hi = byte_at(data, offset + 1, layer)?;
    Ok(u16::from_le_bytes([lo, hi]))
}

/// Checked 48-bit big-endian MAC read into the low bytes of a u64.
#[inline]
pub(crate) fn mac_at(data: &[u8], offset: usize, layer: &'static str) -> Result<u64, DecodeError> {
    let mut mac = 0u64;
    for i in 0..6 {
        mac = (mac << 8) | byte_at(data, offset + i, layer)? as u64;
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_reads() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
        assert_eq!(byte_at(&data, 0, "t").unwrap(), 0x12);
        assert_eq!(be_u16(&data, 0, "t").unwrap(), 0x1234);
        assert_eq!(le_u16(&data, 0, "t").unwrap(), 0x3412);
        assert_eq!(be_u32(&data, 1, "t").unwrap(), 0x3456_789A);
        assert_eq!(mac_at(&data, 0, "t").unwrap(), 0x1234_5678_9ABC);
    }

    #[test]
    fn test_checked_reads_report_truncation() {
        let data = [0u8; 4];
        assert!(matches!(
            byte_at(&data, 4, "t"),
            Err(DecodeError::Truncated { needed: 4, have: 4, .. })
        ));
        assert!(be_u16(&data, 3, "t").is_err());
        assert!(mac_at(&data, 0, "t").is_err());
    }
}
