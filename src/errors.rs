//! Error types for cadvault
//!
//! This module defines the error types for all components of the crate.
//! Each subsystem has its own error enum; `AppError` rolls them up so
//! callers that do not care about the subsystem can handle one type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reaching a data-source backend
#[derive(Error, Debug)]
pub enum SourceError {
    /// Backend cannot be reached (connection, authentication or IO failure).
    /// Retryable; surfaced to the user together with the source identity.
    #[error("data source '{source_label}' unavailable: {reason}")]
    BackendUnavailable { source_label: String, reason: String },

    /// A path vanished between listing and use. Treated as "re-list and
    /// continue", not fatal.
    #[error("path not found on data source '{source_label}': {path}")]
    NotFound { source_label: String, path: String },

    /// I/O error on the local side of a transfer
    #[error("local I/O error")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Build a `BackendUnavailable` from any displayable cause
    pub fn unavailable(source_label: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable {
            source_label: source_label.into(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(source_label: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            source_label: source_label.into(),
            path: path.into(),
        }
    }
}

/// Metadata store parsing and resolution errors
#[derive(Error, Debug)]
pub enum MetadataError {
    /// I/O error reading or writing a metadata store file
    #[error("I/O error on metadata store")]
    Io(#[from] std::io::Error),

    /// Malformed line in a metadata store file
    #[error("invalid metadata store syntax at line {line}: {content}")]
    InvalidSyntax { line: usize, content: String },

    /// An include chain loops back on itself
    #[error("metadata include cycle detected at {path}")]
    IncludeCycle { path: PathBuf },
}

/// Transfer queue and copy errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// A single file failed to copy. Recorded and reported, does not abort
    /// the batch.
    #[error("transfer failed for '{file_name}': {cause}")]
    TransferFailed { file_name: String, cause: String },

    /// The batch target directory could not be created. Fatal for the whole
    /// batch, reported once.
    #[error("failed to create target directory {path}: {cause}")]
    DirectoryCreateFailed { path: PathBuf, cause: String },

    /// Operation is not valid in the queue's current state
    #[error("invalid queue state transition from {from} to {to}")]
    InvalidState { from: String, to: String },
}

/// Persisted configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error reading or writing the configuration file
    #[error("I/O error on configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML
    #[error("invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("configuration serialization failed")]
    Serialize(#[from] toml::ser::Error),

    /// A single data-source entry is malformed. That source is skipped,
    /// others still load.
    #[error("invalid data source entry '{label}': {reason}")]
    ConfigInvalid { label: String, reason: String },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Source(SourceError::BackendUnavailable { .. })
                | AppError::Source(SourceError::NotFound { .. })
                | AppError::Transfer(TransferError::TransferFailed { .. })
        )
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Source(_) => "source",
            AppError::Metadata(_) => "metadata",
            AppError::Transfer(_) => "transfer",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Source result type alias
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Metadata result type alias
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Transfer result type alias
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
