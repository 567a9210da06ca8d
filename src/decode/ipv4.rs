//! IPv4 network decoder.

use std::net::{IpAddr, Ipv4Addr};

use super::{be_u16, byte_at, ipsec, protocol, NetworkHeader};
use crate::diag::Diag;
use crate::error::DecodeError;
use crate::trace::Frame;

const LAYER: &str = "ipv4";

/// Decode an IPv4 header starting at `offset`.
///
/// Unwraps one level of 6in4, ESP, and AH encapsulation; the returned
/// header length spans everything up to the transport header. A failed ESP
/// trailer probe is logged and downgrades the frame to protocol 0 (skip)
/// rather than erroring.
pub fn decode(
    data: &[u8],
    offset: usize,
    diag: &mut Diag,
    frame: &Frame,
) -> Result<NetworkHeader, DecodeError> {
    let first = byte_at(data, offset, LAYER)?;
    let mut header_length = ((first & 0x0F) as usize) * 4;
    let total_length = be_u16(data, offset + 2, LAYER)? as usize;
    let mut next_protocol = byte_at(data, offset + 9, LAYER)?;

    let source_ip = IpAddr::V4(Ipv4Addr::new(
        byte_at(data, offset + 12, LAYER)?,
        byte_at(data, offset + 13, LAYER)?,
        byte_at(data, offset + 14, LAYER)?,
        byte_at(data, offset + 15, LAYER)?,
    ));
    let dest_ip = IpAddr::V4(Ipv4Addr::new(
        byte_at(data, offset + 16, LAYER)?,
        byte_at(data, offset + 17, LAYER)?,
        byte_at(data, offset + 18, LAYER)?,
        byte_at(data, offset + 19, LAYER)?,
    ));

    // A zero total length (TSO captures) bounds the payload by the buffer.
    let mut last_byte_offset = if total_length == 0 {
        data.len() - 1
    } else {
        offset + total_length - 1
    };

    if next_protocol == protocol::IPV6_ENCAP {
        // 6in4: take the inner next-header; inner extension headers are
        // not walked further.
        next_protocol = byte_at(data, offset + header_length + 6, LAYER)?;
        header_length += 40;
    }

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

    Ok(NetworkHeader {
        source_ip,
        dest_ip,
        protocol: next_protocol,
        header_length,
        last_byte_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{FileId, Frame};

    /// Build an IPv4 header with the given protocol and payload.
    pub(crate) fn build_ipv4(
        src: [u8; 4],
        dst: [u8; 4],
        next_protocol: u8,
        payload: &[u8],
    ) -> Vec<u8> {
        let total = 20 + payload.len();
        let mut data = Vec::new();
        data.push(0x45); // version 4, IHL 5
        data.push(0x00);
        data.extend_from_slice(&(total as u16).to_be_bytes());
        data.extend_from_slice(&[0x00, 0x01]); // identification
        data.extend_from_slice(&[0x00, 0x00]); // flags + fragment offset
        data.push(64); // ttl
        data.push(next_protocol);
        data.extend_from_slice(&[0x00, 0x00]); // checksum
        data.extend_from_slice(&src);
        data.extend_from_slice(&dst);
        data.extend_from_slice(payload);
        data
    }

    fn test_frame() -> Frame {
        Frame::new(FileId::new(0), 1, 0, 1, 0, 0)
    }

    #[test]
    fn test_basic_tcp_header() {
        let data = build_ipv4([10, 0, 0, 1], [10, 0, 0, 2], protocol::TCP, &[0u8; 20]);
        let mut diag = Diag::new();
        let net = decode(&data, 0, &mut diag, &test_frame()).unwrap();

        assert_eq!(net.source_ip, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(net.dest_ip, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(net.protocol, protocol::TCP);
        assert_eq!(net.header_length, 20);
        assert_eq!(net.last_byte_offset, 39);
    }

    #[test]
    fn test_zero_total_length_bounded_by_buffer() {
        let mut data = build_ipv4([10, 0, 0, 1], [10, 0, 0, 2], protocol::TCP, &[0u8; 8]);
        data[2..4].copy_from_slice(&[0, 0]);
        let mut diag = Diag::new();
        let net = decode(&data, 0, &mut diag, &test_frame()).unwrap();
        assert_eq!(net.last_byte_offset, data.len() - 1);
    }

    #[test]
    fn test_esp_unwrap() {
        // ESP header (8 bytes of SPI + sequence), 16 payload bytes, then a
        // trailer with 2 padding bytes and a 12-byte integrity blob.
        let mut payload = vec![0u8; 8];
        payload.extend_from_slice(&[0x11; 16]);
        payload.extend_from_slice(&ipsec::build_trailer(2, protocol::TCP, 12));

        let data = build_ipv4([10, 0, 0, 1], [10, 0, 0, 2], protocol::ESP, &payload);
        let mut diag = Diag::new();
        let net = decode(&data, 0, &mut diag, &test_frame()).unwrap();

        assert_eq!(net.protocol, protocol::TCP);
        assert_eq!(net.header_length, 28); // 20 IP + 8 ESP
        assert_eq!(net.last_byte_offset, data.len() - 1 - 16); // blob+2+pad trimmed
        assert_eq!(diag.esp_failures(), 0);
    }

    #[test]
    fn test_esp_failure_downgrades_to_skip() {
        let payload = vec![0x5Au8; 40]; // no valid trailer at either length
        let data = build_ipv4([10, 0, 0, 1], [10, 0, 0, 2], protocol::ESP, &payload);
        let mut diag = Diag::new();
        let net = decode(&data, 0, &mut diag, &test_frame()).unwrap();

        assert_eq!(net.protocol, protocol::NONE);
        assert_eq!(diag.esp_failures(), 1);
    }

    #[test]
    fn test_ah_unwrap() {
        // AH: next header TCP, payload length 4 words -> 24 bytes total.
        let mut payload = Vec::new();
        payload.push(protocol::TCP);
        payload.push(4);
        payload.extend_from_slice(&[0u8; 22]);
        payload.extend_from_slice(&[0u8; 20]); // TCP header stand-in

        let data = build_ipv4([10, 0, 0, 1], [10, 0, 0, 2], protocol::AH, &payload);
        let mut diag = Diag::new();
        let net = decode(&data, 0, &mut diag, &test_frame()).unwrap();

        assert_eq!(net.protocol, protocol::TCP);
        assert_eq!(net.header_length, 44); // 20 IP + 24 AH
    }

    #[test]
    fn test_6in4_takes_inner_next_header() {
        // Inner IPv6 fixed header with next-header TCP at inner offset 6.
        let mut inner = vec![0u8; 40];
        inner[6] = protocol::TCP;
        inner.extend_from_slice(&[0u8; 20]);

        let data = build_ipv4([10, 0, 0, 1], [10, 0, 0, 2], protocol::IPV6_ENCAP, &inner);
        let mut diag = Diag::new();
        let net = decode(&data, 0, &mut diag, &test_frame()).unwrap();

        assert_eq!(net.protocol, protocol::TCP);
        assert_eq!(net.header_length, 60); // 20 IP + 40 inner IPv6
    }

    #[test]
    fn test_truncated_header() {
        let data = [0x45, 0x00, 0x00];
        let mut diag = Diag::new();
        assert!(decode(&data, 0, &mut diag, &test_frame()).is_err());
    }
}
