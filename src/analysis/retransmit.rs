//! Retransmitted-segment marking.
//!
//! For every TCP segment with at least 8 payload bytes, earlier
//! same-direction segments of the conversation are scanned newest-first,
//! up to a fixed predecessor budget. A predecessor matches when payload
//! lengths are equal and the sequence number is either identical or falls
//! strictly inside the predecessor's sequence range. Sequence arithmetic
//! wraps mod 2^32.
//!
//! Counters are recomputed from scratch on every run, so the pass is
//! idempotent.

use crate::config::EngineConfig;
use crate::trace::TraceStore;

/// Payload bytes below which a segment is never considered a retransmit.
const MIN_RETRANSMIT_PAYLOAD: usize = 8;

/// Mark duplicate and overlapping TCP segments.
pub fn mark_retransmits(store: &mut TraceStore, config: &EngineConfig) {
    for conv_id in store.conversation_ids().collect::<Vec<_>>() {
        if store.conversation(conv_id).is_udp {
            continue;
        }
        {
            let conv = store.conversation_mut(conv_id);
            conv.raw_retransmits = 0;
            conv.sig_retransmits = 0;
        }

        let members = store.conversation(conv_id).frames.clone();
        for (position, &frame_id) in members.iter().enumerate() {
            let frame = store.frame(frame_id);
            let payload_len = frame.payload_len();
            if payload_len < MIN_RETRANSMIT_PAYLOAD {
                continue;
            }
            let direction = frame.is_from_client;
            let seq_no = frame.seq_no;

            let mut scanned = 0;
            for &prior_id in members[..position].iter().rev() {
                let prior = store.frame(prior_id);
                if prior.is_from_client != direction {
                    continue;
                }
                scanned += 1;

                let prior_len = prior.payload_len();
                if prior_len == payload_len {
                    let delta = seq_no.wrapping_sub(prior.seq_no);
                    if delta == 0 || (delta as usize) < prior_len {
                        store.frame_mut(frame_id).is_retransmit = true;
                        let conv = store.conversation_mut(conv_id);
                        conv.raw_retransmits += 1;
                        if payload_len > 1 {
                            conv.sig_retransmits += 1;
                        }
                        break;
                    }
                }

                if scanned >= config.back_scan_limit {
                    break;
                }
            }
        }
    }
}
