//! Transfer queue types

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::app::source::DataSource;

/// One file selected for download
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source: Arc<dyn DataSource>,
    /// Source-relative path of the file
    pub rel_path: String,
    /// File name used for the local copy under the target directory
    pub file_name: String,
}

/// Per-file state in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    InProgress,
    Done,
    Failed,
}

/// Aggregate state of the batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchState {
    #[default]
    Idle,
    Running,
    Paused,
    Aborted,
    Completed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Idle => "idle",
            BatchState::Running => "running",
            BatchState::Paused => "paused",
            BatchState::Aborted => "aborted",
            BatchState::Completed => "completed",
        };
        write!(f, "{name}")
    }
}

/// Progress and error notifications emitted by the engine.
///
/// Each file produces `AboutToCopy` exactly once per attempt and then
/// exactly one of `FileCopied` or `FileError`; files interrupted by an
/// abort produce neither and go back to pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    AboutToCopy { file_name: String },
    FileCopied { file_name: String, local_path: PathBuf },
    FileError { file_name: String, cause: String },
    BatchError { cause: String },
    BatchStateChanged { state: BatchState },
}

/// Counts of queue entries by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
}

impl BatchProgress {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.done + self.failed
    }
}
