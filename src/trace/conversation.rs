//! Conversations and their directional 5-tuple key.

use std::net::IpAddr;

use super::FrameId;

/// Directional 5-tuple identifying a conversation.
///
/// Stored in client→server orientation. The IP version is carried by the
/// `IpAddr` variants, so mixed v4/v6 tuples never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub source_ip: IpAddr,
    pub source_port: u16,
    pub dest_ip: IpAddr,
    pub dest_port: u16,
}

impl ConversationKey {
    /// The same tuple with source and destination swapped.
    pub fn reversed(&self) -> Self {
        ConversationKey {
            source_ip: self.dest_ip,
            source_port: self.dest_port,
            dest_ip: self.source_ip,
            dest_port: self.source_port,
        }
    }

    /// Secondary-index bucket. XOR is direction-symmetric, so the bucket is
    /// the same no matter which way the packet was travelling.
    #[inline]
    pub fn bucket(&self) -> u16 {
        self.source_port ^ self.dest_port
    }

    #[inline]
    pub fn is_ipv6(&self) -> bool {
        self.source_ip.is_ipv6()
    }
}

/// A set of frames sharing a directional 5-tuple.
///
/// Split on TCP port reuse (see
/// [`TraceStore::rollover_conversation`](super::TraceStore::rollover_conversation)).
#[derive(Debug, Clone)]
pub struct Conversation {
    /// 5-tuple in client→server orientation.
    pub key: ConversationKey,
    pub is_udp: bool,
    /// True once an SMP shim was seen on this conversation.
    pub is_mars_enabled: bool,
    /// IP next-protocol that attached the conversation (6 or 17).
    pub next_protocol: u8,
    pub start_ticks: i64,
    pub end_ticks: i64,
    /// Frames sent by the client.
    pub source_frames: u64,
    /// Frames sent by the server.
    pub dest_frames: u64,
    /// Sum of on-wire frame lengths, both directions.
    pub total_bytes: u64,
    pub syn_count: u64,
    pub ack_count: u64,
    pub fin_count: u64,
    pub rst_count: u64,
    pub push_count: u64,
    pub keepalive_count: u64,
    /// All retransmitted segments.
    pub raw_retransmits: u64,
    /// Retransmitted segments with more than one payload byte.
    pub sig_retransmits: u64,
    /// Decode attempts that indexed past the captured bytes.
    pub truncation_error_count: u64,
    /// Captured length of the first truncated frame (0 = none seen yet).
    pub truncated_frame_length: u32,
    /// Tick of the first FIN segment (0 = none seen yet).
    pub first_fin_ticks: i64,
    /// Tick of the first RST segment (0 = none seen yet).
    pub first_rst_ticks: i64,
    /// Client MAC, 48 bits in the low bytes (0 = not yet recorded).
    pub source_mac: u64,
    /// Server MAC, 48 bits in the low bytes (0 = not yet recorded).
    pub dest_mac: u64,
    /// Member frames in insertion (capture-time) order.
    pub frames: Vec<FrameId>,
}

impl Conversation {
    pub fn new(key: ConversationKey, ticks: i64, next_protocol: u8) -> Self {
        Conversation {
            key,
            is_udp: false,
            is_mars_enabled: false,
            next_protocol,
            start_ticks: ticks,
            end_ticks: ticks,
            source_frames: 0,
            dest_frames: 0,
            total_bytes: 0,
            syn_count: 0,
            ack_count: 0,
            fin_count: 0,
            rst_count: 0,
            push_count: 0,
            keepalive_count: 0,
            raw_retransmits: 0,
            sig_retransmits: 0,
            truncation_error_count: 0,
            truncated_frame_length: 0,
            first_fin_ticks: 0,
            first_rst_ticks: 0,
            source_mac: 0,
            dest_mac: 0,
            frames: Vec::new(),
        }
    }

    #[inline]
    pub fn is_ipv6(&self) -> bool {
        self.key.is_ipv6()
    }

    /// Total member frames.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
