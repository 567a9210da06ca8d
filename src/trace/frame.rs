//! A single decoded frame.

use bytes::Bytes;

use super::{ConvId, FileId};

/// One decoded packet in the trace.
///
/// Frames are immutable after ingest except for the three marker fields
/// (`is_from_client` via direction fixup, `is_retransmit`,
/// `is_continuation`) written by the post-processing passes.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame number assigned by the source file (1-based).
    pub number: u32,
    /// Absolute tick (100-ns units since 0001-01-01 UTC).
    pub ticks: i64,
    /// Owning capture file.
    pub file: FileId,
    /// Conversation this frame belongs to, set during transport decode.
    pub conversation: Option<ConvId>,
    /// Length of the frame on the wire.
    pub frame_length: u32,
    /// Bytes actually captured (≤ `frame_length` when truncated).
    pub captured_length: u32,
    /// Index of the final valid byte in the raw buffer, as bounded by the
    /// IP payload length and clamped to the captured bytes.
    pub last_byte_offset: usize,
    /// Link type of the source file.
    pub link_type: u16,
    /// True when the frame travels in the client→server direction.
    pub is_from_client: bool,
    /// TCP sequence number.
    pub seq_no: u32,
    /// TCP acknowledgement number.
    pub ack_no: u32,
    /// TCP flags byte.
    pub flags: u8,
    /// TCP receive window.
    pub window: u16,
    /// SMP session id when the conversation multiplexes MARS sessions.
    pub smp_session: Option<u16>,
    /// Extracted transport payload (possibly empty).
    pub payload: Bytes,
    pub is_udp: bool,
    pub is_retransmit: bool,
    pub is_continuation: bool,
}

impl Frame {
    pub fn new(
        file: FileId,
        number: u32,
        ticks: i64,
        link_type: u16,
        frame_length: u32,
        captured_length: u32,
    ) -> Self {
        Frame {
            number,
            ticks,
            file,
            conversation: None,
            frame_length,
            captured_length,
            last_byte_offset: 0,
            link_type,
            is_from_client: false,
            seq_no: 0,
            ack_no: 0,
            flags: 0,
            window: 0,
            smp_session: None,
            payload: Bytes::new(),
            is_udp: false,
            is_retransmit: false,
            is_continuation: false,
        }
    }

    /// Length of the extracted payload in bytes.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the capture truncated this frame.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.captured_length < self.frame_length
    }
}
