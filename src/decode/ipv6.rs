//! IPv6 network decoder.
//!
//! Only the fixed 40-byte header is parsed. ESP and AH are unwrapped the
//! same way as for IPv4; any other recognized extension header is not
//! walked — the frame is dropped with a diagnostic instead.

use std::net::{IpAddr, Ipv6Addr};

use super::{be_u16, byte_at, ipsec, protocol, NetworkHeader};
use crate::diag::Diag;
use crate::error::DecodeError;
use crate::trace::Frame;

const LAYER: &str = "ipv6";

/// Fixed IPv6 header length.
const HEADER_LEN: usize = 40;

/// Extension headers that are recognized but not walked: hop-by-hop,
/// routing, fragment, AH (when not unwrapped), destination options,
/// mobility.
const IGNORED_EXTENSION_HEADERS: [u8; 6] = [0, 43, 44, 51, 60, 135];

/// Decode an IPv6 fixed header starting at `offset`.
pub fn decode(
    data: &[u8],
    offset: usize,
    diag: &mut Diag,
    frame: &Frame,
) -> Result<NetworkHeader, DecodeError> {
    let payload_length = be_u16(data, offset + 4, LAYER)? as usize;
    let mut next_protocol = byte_at(data, offset + 6, LAYER)?;
    let source_ip = IpAddr::V6(ipv6_at(data, offset + 8)?);
    let dest_ip = IpAddr::V6(ipv6_at(data, offset + 24)?);

    let mut header_length = HEADER_LEN;
    let mut last_byte_offset = if payload_length == 0 {
        data.len() - 1
    } else {
        offset + HEADER_LEN + payload_length - 1
    };

    if next_protocol == protocol::ESP {
        match ipsec::esp_trailer(data, last_byte_offset) {
            Ok(trailer) => {
                next_protocol = trailer.next_protocol;
                last_byte_offset = last_byte_offset.saturating_sub(trailer.trailer_length);
                header_length += 8;
            }
            Err(_) => {
                diag.esp_trailer_failure(frame.file, frame.number);
                next_protocol = protocol::NONE;
            }
        }
    }

    if next_protocol == protocol::AH {
        let (next, added) = ipsec::ah_skip(data, offset, header_length)?;
        next_protocol = next;
        header_length += added;
    }

    if IGNORED_EXTENSION_HEADERS.contains(&next_protocol) {
        return Err(DecodeError::UnsupportedExtensionHeader {
            next_header: next_protocol,
        });
    }

    Ok(NetworkHeader {
        source_ip,
        dest_ip,
        protocol: next_protocol,
        header_length,
        last_byte_offset,
    })
}

fn ipv6_at(data: &[u8], offset: usize) -> Result<Ipv6Addr, DecodeError> {
    let mut bytes = [0u8; 16];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = byte_at(data, offset + i, LAYER)?;
    }
    Ok(Ipv6Addr::from(bytes))
}
