//! Ethernet II link decoder.

use super::{be_u16, mac_at};
use crate::error::DecodeError;

/// Link type constant for Ethernet.
pub const LINKTYPE_ETHERNET: u16 = 1;
/// Link type constant for WiFi (recognized, unsupported).
pub const LINKTYPE_WIFI: u16 = 6;
/// Link type constant for NetEvent (recognized, unsupported).
pub const LINKTYPE_NETEVENT: u16 = 0xFFE0;

/// Well-known EtherTypes.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
}

/// Decoded Ethernet header after VLAN stripping.
#[derive(Debug, Clone, Copy)]
pub struct LinkHeader {
    /// Destination MAC, 48 bits in the low bytes.
    pub dest_mac: u64,
    /// Source MAC, 48 bits in the low bytes.
    pub source_mac: u64,
    /// Final EtherType after all 802.1Q tags.
    pub ethertype: u16,
    /// Offset of the network-layer header.
    pub payload_offset: usize,
}

/// Decode an Ethernet II header, stripping zero or more 802.1Q tags.
pub fn decode(data: &[u8]) -> Result<LinkHeader, DecodeError> {
    const LAYER: &str = "ethernet";

    let dest_mac = mac_at(data, 0, LAYER)?;
    let source_mac = mac_at(data, 6, LAYER)?;

    let mut offset = 12;
    let mut ethertype = be_u16(data, offset, LAYER)?;
    while ethertype == ethertype::VLAN {
        offset += 4;
        ethertype = be_u16(data, offset, LAYER)?;
    }

    Ok(LinkHeader {
        dest_mac,
        source_mac,
        ethertype,
        payload_offset: offset + 2,
    })
}
