//! Post-processing passes over the completed trace.
//!
//! Three passes run serially once ingest is done, in a fixed order:
//! direction fixup, then retransmit marking, then continuation marking.
//! The order matters — the continuation scan skips retransmitted
//! predecessors, so it depends on the retransmit pass having run.
//!
//! Each pass touches only the marker fields on frames and the aggregate
//! counters on conversations; everything else in the trace is immutable
//! after ingest.

mod continuation;
mod direction;
mod retransmit;

pub use continuation::mark_continuations;
pub use direction::fix_directions;
pub use retransmit::mark_retransmits;

use crate::config::EngineConfig;
use crate::trace::TraceStore;

/// Run all post-processing passes in order.
pub fn run_passes(store: &mut TraceStore, config: &EngineConfig) {
    fix_directions(store);
    mark_retransmits(store, config);
    mark_continuations(store, config);
}
