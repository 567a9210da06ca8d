//! TCP transport decoder.
//!
//! Parses the TCP header, attaches the frame to its conversation (creating
//! or rolling it over as needed), updates the per-flag counters, unwraps an
//! SMP multiplexing shim when present, and extracts the payload.

use bytes::Bytes;

use super::{be_u16, be_u32, byte_at, le_u16, NetworkHeader};
use crate::config::EngineConfig;
use crate::error::DecodeError;
use crate::trace::{ConversationKey, Frame, TraceStore};

const LAYER: &str = "tcp";

/// TCP flag bits.
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
    pub const ECE: u8 = 0x40;
    pub const CWR: u8 = 0x80;
}

/// First payload byte of an SMP packet ('S').
pub const SMP_PACKET_FLAG: u8 = 0x53;

/// Length of the SMP shim header.
pub const SMP_HEADER_LEN: usize = 16;

/// Minimum payload for the SMP probe.
const SMP_MIN_PAYLOAD: i64 = 16;

/// Decode a TCP header starting at `offset` and attach the frame.
pub(crate) fn decode(
    store: &mut TraceStore,
    config: &EngineConfig,
    frame: &mut Frame,
    data: &[u8],
    net: &NetworkHeader,
    offset: usize,
) -> Result<(), DecodeError> {
    let source_port = be_u16(data, offset, LAYER)?;
    let dest_port = be_u16(data, offset + 2, LAYER)?;
    frame.seq_no = be_u32(data, offset + 4, LAYER)?;
    frame.ack_no = be_u32(data, offset + 8, LAYER)?;
    let header_length = ((byte_at(data, offset + 12, LAYER)? >> 4) as usize) * 4;
    frame.flags = byte_at(data, offset + 13, LAYER)?;
    frame.window = be_u16(data, offset + 14, LAYER)?;

    let key = ConversationKey {
        source_ip: net.source_ip,
        source_port,
        dest_ip: net.dest_ip,
        dest_port,
    };

    let (conv_id, is_from_client) = match store.find_conversation(&key) {
        Some((id, is_from_client)) => {
            let conv = store.conversation(id);
            // TCP port reuse: a SYN against a finished (or long-reset)
            // conversation starts a fresh one on the same 5-tuple.
            let reuse = !conv.is_udp
                && frame.flags & flags::SYN != 0
                && (conv.fin_count >= 1
                    || (conv.rst_count >= 1
                        && frame.ticks - conv.end_ticks > config.rollover_gap_ticks));
            if reuse {
                (store.rollover_conversation(id, frame.ticks), is_from_client)
            } else {
                (id, is_from_client)
            }
        }
        None => (store.new_conversation(key, frame.ticks, net.protocol), true),
    };
    frame.conversation = Some(conv_id);
    frame.is_from_client = is_from_client;

    let conv = store.conversation_mut(conv_id);
    if frame.flags & flags::FIN != 0 {
        conv.fin_count += 1;
        if conv.first_fin_ticks == 0 {
            conv.first_fin_ticks = frame.ticks;
        }
    }
    if frame.flags & flags::SYN != 0 {
        conv.syn_count += 1;
    }
    if frame.flags & flags::RST != 0 {
        conv.rst_count += 1;
        if conv.first_rst_ticks == 0 {
            conv.first_rst_ticks = frame.ticks;
        }
    }
    if frame.flags & flags::PSH != 0 {
        conv.push_count += 1;
    }
    if frame.flags & flags::ACK != 0 {
        conv.ack_count += 1;
    }

    let mut last_byte_offset = net.last_byte_offset;
    let mut payload_start = offset + header_length;
    let payload_length = last_byte_offset as i64 - payload_start as i64 + 1;

    // SMP shim: MARS multiplexes logical sessions over one connection
    // behind a 16-byte header flagged by a leading 'S'.
    if payload_length >= SMP_MIN_PAYLOAD && byte_at(data, payload_start, LAYER)? == SMP_PACKET_FLAG
    {
        conv.is_mars_enabled = true;
        frame.smp_session = Some(le_u16(data, payload_start + 2, LAYER)?);
        payload_start += SMP_HEADER_LEN;
    }

    if last_byte_offset >= data.len() {
        last_byte_offset = data.len() - 1;
    }
    frame.last_byte_offset = last_byte_offset;

    if payload_start <= last_byte_offset {
        frame.payload = Bytes::copy_from_slice(&data[payload_start..=last_byte_offset]);
    }

    // Keepalive: one zero byte, ACK alone.
    if frame.payload.len() == 1
        && frame.payload[0] == 0
        && frame.flags & flags::ACK != 0
        && frame.flags & (flags::FIN | flags::SYN | flags::RST | flags::PSH) == 0
    {
        conv.keepalive_count += 1;
    }

    Ok(())
}

/// Build a TCP header (20 bytes, no options) followed by a payload.
#[cfg(test)]
pub(crate) fn build_tcp(
    source_port: u16,
    dest_port: u16,
    seq: u32,
    ack: u32,
    flag_bits: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&source_port.to_be_bytes());
    data.extend_from_slice(&dest_port.to_be_bytes());
    data.extend_from_slice(&seq.to_be_bytes());
    data.extend_from_slice(&ack.to_be_bytes());
    data.push(0x50); // data offset 5 words
    data.push(flag_bits);
    data.extend_from_slice(&0xFFFFu16.to_be_bytes()); // window
    data.extend_from_slice(&[0x00, 0x00]); // checksum
    data.extend_from_slice(&[0x00, 0x00]); // urgent pointer
    data.extend_from_slice(payload);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::FileId;
    use std::net::IpAddr;

    fn net_for(data: &[u8]) -> NetworkHeader {
        NetworkHeader {
            source_ip: "10.0.0.1".parse::<IpAddr>().unwrap(),
            dest_ip: "10.0.0.2".parse::<IpAddr>().unwrap(),
            protocol: 6,
            header_length: 0,
            last_byte_offset: data.len() - 1,
        }
    }

    fn run(store: &mut TraceStore, data: &[u8], ticks: i64) -> Frame {
        let mut frame = Frame::new(FileId::new(0), 1, ticks, 1, data.len() as u32, data.len() as u32);
        frame.ticks = ticks;
        let net = net_for(data);
        decode(store, &EngineConfig::default(), &mut frame, data, &net, 0).unwrap();
        frame
    }

    #[test]
    fn test_header_fields_and_payload() {
        let mut store = TraceStore::new();
        let data = build_tcp(50000, 1433, 0x1000, 0x2000, flags::PSH | flags::ACK, b"hello tds");
        let frame = run(&mut store, &data, 100);

        assert_eq!(frame.seq_no, 0x1000);
        assert_eq!(frame.ack_no, 0x2000);
        assert_eq!(frame.flags, flags::PSH | flags::ACK);
        assert_eq!(frame.window, 0xFFFF);
        assert_eq!(frame.payload.as_ref(), b"hello tds");
        assert!(frame.is_from_client);

        let conv = store.conversation(frame.conversation.unwrap());
        assert_eq!(conv.push_count, 1);
        assert_eq!(conv.ack_count, 1);
        assert_eq!(conv.key.source_port, 50000);
        assert_eq!(conv.key.dest_port, 1433);
    }

    #[test]
    fn test_reverse_direction_reuses_conversation() {
        let mut store = TraceStore::new();
        let syn = build_tcp(50000, 1433, 1, 0, flags::SYN, &[]);
        let first = run(&mut store, &syn, 100);

        let syn_ack = build_tcp(1433, 50000, 900, 2, flags::SYN | flags::ACK, &[]);
        let second = run(&mut store, &syn_ack, 200);

        assert_eq!(first.conversation, second.conversation);
        assert!(first.is_from_client);
        assert!(!second.is_from_client);
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.conversation(first.conversation.unwrap()).syn_count, 2);
    }

    #[test]
    fn test_smp_shim_extraction() {
        let mut store = TraceStore::new();
        // 16-byte SMP header: 'S', flags, session id 7 (LE), then TDS bytes.
        let mut payload = vec![0u8; SMP_HEADER_LEN];
        payload[0] = SMP_PACKET_FLAG;
        payload[2..4].copy_from_slice(&7u16.to_le_bytes());
        payload.extend_from_slice(b"tds payload");

        let data = build_tcp(50000, 1433, 1, 1, flags::ACK, &payload);
        let frame = run(&mut store, &data, 100);

        assert_eq!(frame.smp_session, Some(7));
        assert_eq!(frame.payload.as_ref(), b"tds payload");
        assert!(store.conversation(frame.conversation.unwrap()).is_mars_enabled);
    }

    #[test]
    fn test_short_payload_is_not_probed_for_smp() {
        let mut store = TraceStore::new();
        let data = build_tcp(50000, 1433, 1, 1, flags::ACK, &[SMP_PACKET_FLAG; 8]);
        let frame = run(&mut store, &data, 100);
        assert_eq!(frame.smp_session, None);
        assert_eq!(frame.payload.len(), 8);
    }

    #[test]
    fn test_keepalive_detection() {
        let mut store = TraceStore::new();
        let keepalive = build_tcp(50000, 1433, 1, 1, flags::ACK, &[0]);
        let frame = run(&mut store, &keepalive, 100);
        let conv = store.conversation(frame.conversation.unwrap());
        assert_eq!(conv.keepalive_count, 1);

        // One non-zero byte is data, not a keepalive.
        let data = build_tcp(50000, 1433, 2, 1, flags::ACK, &[1]);
        let frame = run(&mut store, &data, 200);
        let conv = store.conversation(frame.conversation.unwrap());
        assert_eq!(conv.keepalive_count, 1);
    }

    #[test]
    fn test_fin_and_rst_first_ticks() {
        let mut store = TraceStore::new();
        let fin = build_tcp(50000, 1433, 1, 1, flags::FIN | flags::ACK, &[]);
        let frame = run(&mut store, &fin, 500);
        let conv_id = frame.conversation.unwrap();
        assert_eq!(store.conversation(conv_id).first_fin_ticks, 500);

        let fin2 = build_tcp(1433, 50000, 9, 2, flags::FIN | flags::ACK, &[]);
        run(&mut store, &fin2, 700);
        let conv = store.conversation(conv_id);
        assert_eq!(conv.fin_count, 2);
        assert_eq!(conv.first_fin_ticks, 500);
        assert_eq!(conv.first_rst_ticks, 0);
    }

    #[test]
    fn test_port_rollover_after_fin() {
        let mut store = TraceStore::new();
        let fin = build_tcp(50000, 1433, 1, 1, flags::FIN | flags::ACK, &[]);
        let first = run(&mut store, &fin, 100).conversation.unwrap();

        let syn = build_tcp(50000, 1433, 5000, 0, flags::SYN, &[]);
        let second = run(&mut store, &syn, 200).conversation.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.conversations().len(), 2);
        assert_eq!(store.conversation(second).syn_count, 1);
        // Subsequent segments land on the successor.
        let ack = build_tcp(50000, 1433, 5001, 1, flags::ACK, &[]);
        assert_eq!(run(&mut store, &ack, 300).conversation.unwrap(), second);
    }

    #[test]
    fn test_rollover_after_rst_requires_gap() {
        let mut store = TraceStore::new();
        let config = EngineConfig::default();

        let rst = build_tcp(50000, 1433, 1, 1, flags::RST, &[]);
        let first = run(&mut store, &rst, 0).conversation.unwrap();

        // SYN inside the 20-second window stays on the old conversation.
        let syn = build_tcp(50000, 1433, 10, 0, flags::SYN, &[]);
        let same = run(&mut store, &syn, config.rollover_gap_ticks / 2)
            .conversation
            .unwrap();
        assert_eq!(same, first);

        // A fresh store: RST then a SYN beyond the window rolls over.
        let mut store = TraceStore::new();
        let first = run(&mut store, &rst, 0).conversation.unwrap();
        let second = run(&mut store, &syn, config.rollover_gap_ticks + 1)
            .conversation
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_truncated_after_attach_reports_error() {
        let mut store = TraceStore::new();
        let mut data = build_tcp(50000, 1433, 1, 1, flags::ACK, &[0xAA; 32]);
        data.truncate(24); // capture cut inside the payload

        let mut net = net_for(&data);
        net.last_byte_offset = 51; // as bounded by the IP total length

        let mut frame = Frame::new(FileId::new(0), 1, 100, 1, 52, 24);
        let result = decode(
            &mut store,
            &EngineConfig::default(),
            &mut frame,
            &data,
            &net,
            0,
        );
        // Attach happened before the payload read failed.
        assert!(frame.conversation.is_some());
        assert!(result.is_ok() || matches!(result, Err(DecodeError::Truncated { .. })));
    }
}
