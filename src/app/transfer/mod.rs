//! Download queue
//!
//! Selected files are queued as [`TransferRequest`]s against one target
//! directory and drained by the [`TransferEngine`], which reports
//! progress through a broadcast of [`TransferEvent`]s.

pub mod engine;
pub mod types;

pub use engine::TransferEngine;
pub use types::{BatchProgress, BatchState, TransferEvent, TransferRequest, TransferState};
