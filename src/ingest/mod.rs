//! Ingest driver.
//!
//! Expands a file spec (with `*`/`?` wildcards) to concrete paths, peeks
//! the first frame of each file to learn its starting tick, sorts the
//! files by that tick, then ingests them in order. Capture tools sometimes
//! re-touch finished files, so the first-frame tick is trusted over the
//! filesystem's modification time.
//!
//! Ingest is strictly sequential: the conversation index, the global frame
//! sequence, and each conversation's append order form one causal chain.
//! The post-processing passes run serially afterwards via
//! [`TraceEngine::finalize`].

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::capture::CaptureReader;
use crate::config::EngineConfig;
use crate::decode;
use crate::diag::Diag;
use crate::error::{CaptureError, Error, Result};
use crate::ticks;
use crate::trace::{CaptureFile, Frame, TraceStore};

/// A capture file scheduled for ingest.
#[derive(Debug, Clone)]
struct OrderedFile {
    path: PathBuf,
    size: u64,
    modified: Option<std::time::SystemTime>,
    first_ticks: i64,
}

/// The ingestion and post-processing engine.
///
/// Single-threaded by design; see the module docs.
pub struct TraceEngine {
    store: TraceStore,
    diag: Diag,
    config: EngineConfig,
}

impl TraceEngine {
    pub fn new(config: EngineConfig) -> Self {
        TraceEngine {
            store: TraceStore::new(),
            diag: Diag::new(),
            config,
        }
    }

    /// Ingest every file matching `file_spec`, in first-frame-tick order.
    ///
    /// Individual file failures are logged and skipped; the error return is
    /// reserved for an unusable spec (no expansion possible).
    pub fn ingest(&mut self, file_spec: &str) -> Result<()> {
        let paths = expand_file_spec(file_spec)?;
        let ordered = order_files(&paths, &mut self.diag);

        let total_bytes: u64 = ordered.iter().map(|f| f.size).sum();
        self.store.reserve_for_input(
            total_bytes,
            self.config.frame_bytes_hint,
            self.config.conversation_bytes_hint,
        );

        for file in &ordered {
            if let Err(e) = self.ingest_file(file) {
                self.diag.file_error(&file.path, &e);
            }
        }
        info!(
            files = ordered.len(),
            frames = self.store.frames().len(),
            conversations = self.store.conversations().len(),
            "ingest complete"
        );
        Ok(())
    }

    /// Run the post-processing passes (direction fixup, retransmit
    /// marking, continuation marking) over the completed trace.
    pub fn finalize(&mut self) {
        crate::analysis::run_passes(&mut self.store, &self.config);
    }

    pub fn store(&self) -> &TraceStore {
        &self.store
    }

    pub fn into_store(self) -> TraceStore {
        self.store
    }

    pub fn diag(&self) -> &Diag {
        &self.diag
    }

    fn ingest_file(&mut self, file: &OrderedFile) -> Result<()> {
        let mut reader = CaptureReader::open(&file.path)?;
        let file_id = self.store.add_file(CaptureFile::new(
            file.path.clone(),
            file.size,
            file.modified,
        ));
        debug!(path = %file.path.display(), "ingesting capture file");

        while let Some(raw) = reader.next_frame()? {
            if !ticks::in_range(raw.ticks) {
                self.diag.bad_timestamp(file_id, raw.number, raw.ticks);
                continue;
            }
            let frame = Frame::new(
                file_id,
                raw.number,
                raw.ticks,
                raw.link_type,
                raw.frame_length,
                raw.captured_length,
            );
            decode::decode_frame(
                &mut self.store,
                &self.config,
                &mut self.diag,
                frame,
                &raw.data,
            );
        }
        Ok(())
    }
}

/// Expand a file spec into concrete paths.
///
/// Specs without wildcards pass through untouched, so a missing file is
/// still reported per-file later rather than silently matching nothing.
fn expand_file_spec(file_spec: &str) -> Result<Vec<PathBuf>> {
    if !file_spec.contains('*') && !file_spec.contains('?') {
        return Ok(vec![PathBuf::from(file_spec)]);
    }

    let entries = glob::glob(file_spec).map_err(|e| {
        Error::Capture(CaptureError::FileAccess {
            path: file_spec.to_string(),
            reason: e.to_string(),
        })
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => {
                debug!(spec = file_spec, error = %e, "unreadable directory entry skipped")
            }
        }
    }
    Ok(paths)
}

/// Peek each file's first frame and sort by its tick.
///
/// Unreadable files are logged and dropped here; frameless files sort
/// first and ingest as empty.
fn order_files(paths: &[PathBuf], diag: &mut Diag) -> Vec<OrderedFile> {
    let mut ordered = Vec::with_capacity(paths.len());
    for path in paths {
        match peek_file(path) {
            Ok(file) => ordered.push(file),
            Err(e) => diag.file_error(path, &e),
        }
    }
    ordered.sort_by_key(|f| f.first_ticks);
    ordered
}

fn peek_file(path: &Path) -> Result<OrderedFile> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        Error::Capture(CaptureError::FileAccess {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    })?;

    let mut reader = CaptureReader::open(path)?;
    let first_ticks = reader.next_frame()?.map(|f| f.ticks).unwrap_or(0);

    Ok(OrderedFile {
        path: path.to_path_buf(),
        size: metadata.len(),
        modified: metadata.modified().ok(),
        first_ticks,
    })
}
