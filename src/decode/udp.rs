//! UDP transport decoder.

use bytes::Bytes;

use super::{be_u16, NetworkHeader};
use crate::error::DecodeError;
use crate::trace::{ConversationKey, Frame, TraceStore};

const LAYER: &str = "udp";

/// Fixed UDP header length.
pub const HEADER_LEN: usize = 8;

/// Decode a UDP header starting at `offset` and attach the frame.
///
/// The datagram length field is ignored; the payload is bounded by the IP
/// last-byte offset, clamped to the captured bytes.
pub(crate) fn decode(
    store: &mut TraceStore,
    frame: &mut Frame,
    data: &[u8],
    net: &NetworkHeader,
    offset: usize,
) -> Result<(), DecodeError> {
    let source_port = be_u16(data, offset, LAYER)?;
    let dest_port = be_u16(data, offset + 2, LAYER)?;

    let key = ConversationKey {
        source_ip: net.source_ip,
        source_port,
        dest_ip: net.dest_ip,
        dest_port,
    };

    let (conv_id, is_from_client) = match store.find_conversation(&key) {
        Some(found) => found,
        None => (store.new_conversation(key, frame.ticks, net.protocol), true),
    };
    frame.conversation = Some(conv_id);
    frame.is_from_client = is_from_client;
    frame.is_udp = true;
    store.conversation_mut(conv_id).is_udp = true;

    let mut last_byte_offset = net.last_byte_offset;
    if last_byte_offset >= data.len() {
        last_byte_offset = data.len() - 1;
    }
    frame.last_byte_offset = last_byte_offset;

    let payload_start = offset + HEADER_LEN;
    if payload_start <= last_byte_offset {
        frame.payload = Bytes::copy_from_slice(&data[payload_start..=last_byte_offset]);
    }

    Ok(())
}

/// Build a UDP header (8 bytes) followed by a payload.
#[cfg(test)]
pub(crate) fn build_udp(source_port: u16, dest_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&source_port.to_be_bytes());
    data.extend_from_slice(&dest_port.to_be_bytes());
    data.extend_from_slice(&((HEADER_LEN + payload.len()) as u16).to_be_bytes());
    data.extend_from_slice(&[0x00, 0x00]); // checksum
    data.extend_from_slice(payload);
    data
}
