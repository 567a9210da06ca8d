//! Client/server role fixup.
//!
//! A capture that starts mid-handshake can record the server's SYN+ACK as
//! the first frame of a conversation, which the index then orients
//! backwards (first sender becomes the client). The first frame's SYN/ACK
//! bits give the truth away: a bare SYN always travels client→server and a
//! SYN+ACK always travels server→client. ECN bits are ignored because only
//! the SYN and ACK bits are consulted.

use std::mem;

use crate::decode::tcp::flags;
use crate::trace::TraceStore;

/// Reverse conversations whose first frame contradicts SYN-from-client.
pub fn fix_directions(store: &mut TraceStore) {
    for conv_id in store.conversation_ids().collect::<Vec<_>>() {
        let Some(&first) = store.conversation(conv_id).frames.first() else {
            continue;
        };
        let frame = store.frame(first);
        if frame.is_udp {
            continue;
        }

        let syn = frame.flags & flags::SYN != 0;
        let ack = frame.flags & flags::ACK != 0;
        let reversed = (syn && !ack && !frame.is_from_client)
            || (syn && ack && frame.is_from_client);
        if !reversed {
            continue;
        }

        let members = store.conversation(conv_id).frames.clone();
        for frame_id in members {
            let frame = store.frame_mut(frame_id);
            frame.is_from_client = !frame.is_from_client;
        }

        let conv = store.conversation_mut(conv_id);
        conv.key = conv.key.reversed();
        mem::swap(&mut conv.source_mac, &mut conv.dest_mac);
        mem::swap(&mut conv.source_frames, &mut conv.dest_frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{CaptureFile, ConversationKey, Frame};

    fn build_store(first_flags: u8, first_from_client: bool) -> (TraceStore, crate::trace::ConvId) {
        let mut store = TraceStore::new();
        let file = store.add_file(CaptureFile::new("t.pcap".into(), 0, None));
        let key = ConversationKey {
            source_ip: "10.0.0.1".parse().unwrap(),
            source_port: 50000,
            dest_ip: "10.0.0.2".parse().unwrap(),
            dest_port: 1433,
        };
        let conv = store.new_conversation(key, 100, 6);
        store.conversation_mut(conv).source_mac = 0x11;
        store.conversation_mut(conv).dest_mac = 0x22;
        store.conversation_mut(conv).source_frames = 1;

        let mut frame = Frame::new(file, 1, 100, 1, 60, 60);
        frame.conversation = Some(conv);
        frame.flags = first_flags;
        frame.is_from_client = first_from_client;
        store.push_frame(frame);
        (store, conv)
    }

    #[test]
    fn test_syn_ack_first_marked_from_client_is_reversed() {
        // Server-initiated capture: SYN+ACK arrived first and was labeled
        // as from-client.
        let (mut store, conv) = build_store(flags::SYN | flags::ACK, true);
        fix_directions(&mut store);

        let conv_ref = store.conversation(conv);
        assert_eq!(conv_ref.key.source_port, 1433);
        assert_eq!(conv_ref.key.dest_port, 50000);
        assert_eq!(conv_ref.source_mac, 0x22);
        assert_eq!(conv_ref.dest_mac, 0x11);
        assert_eq!(conv_ref.source_frames, 0);
        assert_eq!(conv_ref.dest_frames, 1);
        let first = conv_ref.frames[0];
        assert!(!store.frame(first).is_from_client);
    }

    #[test]
    fn test_bare_syn_from_server_is_reversed() {
        let (mut store, conv) = build_store(flags::SYN, false);
        fix_directions(&mut store);
        let first = store.conversation(conv).frames[0];
        assert!(store.frame(first).is_from_client);
    }

    #[test]
    fn test_correct_orientation_untouched() {
        let (mut store, conv) = build_store(flags::SYN, true);
        fix_directions(&mut store);
        let conv_ref = store.conversation(conv);
        assert_eq!(conv_ref.key.source_port, 50000);
        assert!(store.frame(conv_ref.frames[0]).is_from_client);
    }

    #[test]
    fn test_fixup_never_applies_twice() {
        let (mut store, conv) = build_store(flags::SYN | flags::ACK, true);
        fix_directions(&mut store);
        let after_once = store.conversation(conv).key;
        // After the reversal the first frame is a SYN+ACK from the server,
        // which is consistent; a second pass must not flip it back.
        fix_directions(&mut store);
        assert_eq!(store.conversation(conv).key, after_once);
    }

    #[test]
    fn test_ecn_bits_ignored() {
        let (mut store, conv) = build_store(flags::SYN | flags::ECE | flags::CWR, false);
        fix_directions(&mut store);
        let first = store.conversation(conv).frames[0];
        assert!(store.frame(first).is_from_client);
    }
}
