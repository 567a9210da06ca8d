//! Continuation-segment marking.
//!
//! A segment continues a logical message when an earlier same-direction
//! segment acknowledged the same peer data without pushing. PUSH bounds a
//! message, so meeting a pushed predecessor ends the scan; retransmitted
//! predecessors are not witnesses. Runs after the retransmit pass.

use crate::config::EngineConfig;
use crate::trace::TraceStore;

/// Mark segments that extend a prior unpushed message.
pub fn mark_continuations(store: &mut TraceStore, config: &EngineConfig) {
    for conv_id in store.conversation_ids().collect::<Vec<_>>() {
        if store.conversation(conv_id).is_udp {
            continue;
        }
        let members = store.conversation(conv_id).frames.clone();
        for (position, &frame_id) in members.iter().enumerate() {
            let frame = store.frame(frame_id);
            if frame.payload_len() == 0 {
                continue;
            }
            let direction = frame.is_from_client;
            let ack_no = frame.ack_no;

            let mut scanned = 0;
            for &prior_id in members[..position].iter().rev() {
                let prior = store.frame(prior_id);
                if prior.is_from_client != direction {
                    continue;
                }
                scanned += 1;

                if prior.flags & crate::decode::tcp::flags::PSH != 0 {
                    break;
                }
                if prior.ack_no == ack_no && !prior.is_retransmit && prior.payload_len() > 0 {
                    store.frame_mut(frame_id).is_continuation = true;
                    break;
                }

                if scanned >= config.back_scan_limit {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tcp::flags;
    use crate::trace::{CaptureFile, ConvId, ConversationKey, FileId, Frame, TraceStore};

    fn new_store() -> (TraceStore, ConvId, FileId) {
        let mut store = TraceStore::new();
        let file = store.add_file(CaptureFile::new("t.pcap".into(), 0, None));
        let key = ConversationKey {
            source_ip: "10.0.0.1".parse().unwrap(),
            source_port: 50000,
            dest_ip: "10.0.0.2".parse().unwrap(),
            dest_port: 1433,
        };
        let conv = store.new_conversation(key, 0, 6);
        (store, conv, file)
    }

    fn push_segment(
        store: &mut TraceStore,
        conv: ConvId,
        file: FileId,
        number: u32,
        from_client: bool,
        ack: u32,
        flag_bits: u8,
        payload_len: usize,
    ) {
        let mut frame = Frame::new(file, number, number as i64 * 10, 1, 600, 600);
        frame.conversation = Some(conv);
        frame.is_from_client = from_client;
        frame.ack_no = ack;
        frame.flags = flag_bits | flags::ACK;
        frame.seq_no = number * 512;
        frame.payload = vec![0xCD; payload_len].into();
        store.push_frame(frame);
    }

    fn marks(store: &TraceStore, conv: ConvId) -> Vec<bool> {
        store
            .conversation(conv)
            .frames
            .iter()
            .map(|&f| store.frame(f).is_continuation)
            .collect()
    }

    #[test]
    fn test_chain_of_unpushed_segments() {
        let (mut store, conv, file) = new_store();
        for n in 1..=4 {
            push_segment(&mut store, conv, file, n, true, 7777, 0, 512);
        }
        mark_continuations(&mut store, &EngineConfig::default());
        assert_eq!(marks(&store, conv), vec![false, true, true, true]);
    }

    #[test]
    fn test_push_bounds_the_message() {
        let (mut store, conv, file) = new_store();
        push_segment(&mut store, conv, file, 1, true, 7777, flags::PSH, 512);
        push_segment(&mut store, conv, file, 2, true, 7777, 0, 512);
        mark_continuations(&mut store, &EngineConfig::default());
        // The pushed predecessor terminates the scan before any match.
        assert_eq!(marks(&store, conv), vec![false, false]);
    }

    #[test]
    fn test_different_ack_not_a_continuation() {
        let (mut store, conv, file) = new_store();
        push_segment(&mut store, conv, file, 1, true, 7777, 0, 512);
        push_segment(&mut store, conv, file, 2, true, 8888, 0, 512);
        mark_continuations(&mut store, &EngineConfig::default());
        assert_eq!(marks(&store, conv), vec![false, false]);
    }

    #[test]
    fn test_retransmitted_predecessor_not_a_witness() {
        let (mut store, conv, file) = new_store();
        push_segment(&mut store, conv, file, 1, true, 7777, 0, 512);
        push_segment(&mut store, conv, file, 2, true, 7777, 0, 512);
        {
            let prior = store.conversation(conv).frames[0];
            store.frame_mut(prior).is_retransmit = true;
        }
        mark_continuations(&mut store, &EngineConfig::default());
        assert_eq!(marks(&store, conv), vec![false, false]);
    }

    #[test]
    fn test_opposite_direction_ignored() {
        let (mut store, conv, file) = new_store();
        push_segment(&mut store, conv, file, 1, false, 7777, 0, 512);
        push_segment(&mut store, conv, file, 2, true, 7777, 0, 512);
        mark_continuations(&mut store, &EngineConfig::default());
        assert_eq!(marks(&store, conv), vec![false, false]);
    }

    #[test]
    fn test_empty_payload_never_marked() {
        let (mut store, conv, file) = new_store();
        push_segment(&mut store, conv, file, 1, true, 7777, 0, 512);
        push_segment(&mut store, conv, file, 2, true, 7777, 0, 0);
        mark_continuations(&mut store, &EngineConfig::default());
        assert_eq!(marks(&store, conv), vec![false, false]);
    }
}
