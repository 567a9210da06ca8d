//! Engine configuration.

use crate::ticks::TICKS_PER_SECOND;

/// Configurable options for a [`TraceEngine`](crate::ingest::TraceEngine).
///
/// The capacity hints size the trace store's initial allocations from the
/// total input bytes; they are performance knobs only and never affect
/// results.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Estimated bytes of input per frame, for pre-sizing the frame arena.
    pub frame_bytes_hint: u64,
    /// Estimated bytes of input per conversation, for pre-sizing the
    /// conversation arena.
    pub conversation_bytes_hint: u64,
    /// Same-direction predecessors examined by the retransmit and
    /// continuation scans.
    pub back_scan_limit: usize,
    /// Minimum idle gap, in ticks, before a SYN on a reset conversation
    /// starts a new conversation on the same 5-tuple.
    pub rollover_gap_ticks: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            frame_bytes_hint: 200,
            conversation_bytes_hint: 50_000,
            back_scan_limit: 20,
            rollover_gap_ticks: 20 * TICKS_PER_SECOND,
        }
    }
}
