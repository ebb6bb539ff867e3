//! cadvault library
//!
//! A Rust library for browsing catalogs of CAD part files spread across
//! heterogeneous backends (local directories, FTP servers) as one tree,
//! enriching directories with externally-defined metadata and downloading
//! selected files with resumable, cancellable transfers.

pub mod app;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
