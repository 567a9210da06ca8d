//! # sqltrace-core
//!
//! Capture-file ingestion and conversation reconstruction for SQL
//! network-trace analysis.
//!
//! The engine reads frames from heterogeneous capture files (NetMon,
//! classic pcap in its four byte-order/resolution variants, pcap-ng, and
//! Event Trace Logs), decodes Ethernet/VLAN/IPv4/IPv6/ESP/AH/TCP/UDP
//! headers byte-exactly, groups frames into conversations keyed on their
//! directional 5-tuple, extracts TCP payloads (unwrapping the SMP
//! multiplexing shim used by MARS), and finishes with three passes that
//! correct inverted client/server roles, mark retransmitted segments, and
//! mark continuation segments.
//!
//! The downstream TDS parser, the CLI, and reporting live outside this
//! crate; they consume the finished [`trace::TraceStore`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use sqltrace_core::{EngineConfig, TraceEngine};
//!
//! let mut engine = TraceEngine::new(EngineConfig::default());
//! engine.ingest("captures/*.pcap").unwrap();
//! engine.finalize();
//!
//! for conv in engine.store().conversations() {
//!     println!(
//!         "{}:{} -> {}:{} frames={}",
//!         conv.key.source_ip,
//!         conv.key.source_port,
//!         conv.key.dest_ip,
//!         conv.key.dest_port,
//!         conv.frame_count(),
//!     );
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +----------------------------------------------------------------+
//! |                        sqltrace-core                           |
//! +----------------------------------------------------------------+
//! |  capture/  - format sniffing, NetMon/pcap/pcap-ng/ETL readers  |
//! |  decode/   - Ethernet+VLAN, IPv4/IPv6, ESP/AH, TCP+SMP, UDP    |
//! |  trace/    - frame/conversation/file arenas, 5-tuple index     |
//! |  ingest/   - file ordering and the per-frame pipeline          |
//! |  analysis/ - direction fixup, retransmit and continuation marks|
//! |  ticks/    - 100-ns timestamp conversions                      |
//! |  diag/     - explicit diagnostic-sink handle                   |
//! |  error/    - error types                                       |
//! +----------------------------------------------------------------+
//! ```

pub mod analysis;
pub mod capture;
pub mod config;
pub mod decode;
pub mod diag;
pub mod error;
pub mod ingest;
pub mod ticks;
pub mod trace;

pub use capture::{CaptureFormat, CaptureReader, RawFrame};
pub use config::EngineConfig;
pub use diag::Diag;
pub use error::{CaptureError, DecodeError, Error, Result};
pub use ingest::TraceEngine;
pub use trace::{
    CaptureFile, ConvId, Conversation, ConversationKey, FileId, Frame, FrameId, TraceStore,
    TraceSummary,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
