//! Capture-file record.

use std::path::PathBuf;
use std::time::SystemTime;

/// One ingested capture file.
#[derive(Debug, Clone)]
pub struct CaptureFile {
    pub path: PathBuf,
    /// Last-write time, when the filesystem reports one.
    pub modified: Option<SystemTime>,
    /// File size in bytes.
    pub size: u64,
    /// Tick of the earliest ingested frame.
    pub start_ticks: i64,
    /// Tick of the latest ingested frame.
    pub end_ticks: i64,
    /// Frames ingested from this file.
    pub frame_count: u64,
}

impl CaptureFile {
    pub fn new(path: PathBuf, size: u64, modified: Option<SystemTime>) -> Self {
        CaptureFile {
            path,
            modified,
            size,
            start_ticks: 0,
            end_ticks: 0,
            frame_count: 0,
        }
    }
}
