//! Polymorphic data-source backends
//!
//! A data source owns a root location (a local directory or an FTP
//! account), enumerates directory children, and copies file contents to a
//! local target. One capability trait, one implementation per variant.

pub mod ftp;
pub mod local;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{DataSourceConfig, SourceKind};
use crate::errors::SourceResult;

pub use ftp::FtpDataSource;
pub use local::LocalDataSource;

/// Raw directory listing entry, not yet classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Outcome of a [`DataSource::copy_file`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The whole file was written to the target path
    Completed { bytes: u64 },
    /// The copy stopped at a chunk checkpoint after an abort request;
    /// partial output has been removed
    Aborted,
}

/// Cooperative cancellation handle shared between the transfer engine and
/// an in-flight copy. Abort requests take effect at chunk boundaries.
#[derive(Debug, Default)]
pub struct CopyController {
    abort: AtomicBool,
}

impl CopyController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Request the copy to stop at its next checkpoint
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Clear a previous abort request (before a resume)
    pub fn reset(&self) {
        self.abort.store(false, Ordering::SeqCst);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

/// Shared capability set of all data-source variants.
///
/// `list_children` must not fail for an empty directory: that is a
/// zero-length success. Paths handed to the capability methods are always
/// relative to the source root, with `/` separators, and stable across
/// reloads as long as the backend path has not moved.
#[async_trait]
pub trait DataSource: Send + Sync + std::fmt::Debug {
    /// Variant kind
    fn kind(&self) -> SourceKind;

    /// User-visible label
    fn label(&self) -> &str;

    /// Stable identity used to group transfers by owning backend
    fn source_id(&self) -> String;

    /// Maximum number of concurrent copies this backend tolerates
    fn concurrency_limit(&self) -> usize;

    /// Snapshot of the persisted configuration for this source
    fn config(&self) -> DataSourceConfig;

    /// Enumerate the children of a directory, in backend enumeration order
    async fn list_children(&self, rel_path: &str) -> SourceResult<Vec<DirEntry>>;

    /// Copy one file to `dest`, in chunks, honoring `controller` between
    /// chunks. Partial output is removed on abort and on error.
    async fn copy_file(
        &self,
        rel_path: &str,
        dest: &Path,
        controller: &Arc<CopyController>,
    ) -> SourceResult<CopyOutcome>;
}

/// Construct the runtime source for a persisted configuration
pub fn from_config(config: &DataSourceConfig) -> Arc<dyn DataSource> {
    match config {
        DataSourceConfig::Local { label, path } => {
            Arc::new(LocalDataSource::new(label.clone(), path.clone()))
        }
        DataSourceConfig::Ftp {
            label,
            host,
            port,
            base_dir,
            login,
            password,
            passive_mode,
        } => Arc::new(FtpDataSource::new(
            label.clone(),
            host.clone(),
            *port,
            base_dir.clone(),
            login.clone(),
            password.clone(),
            *passive_mode,
        )),
    }
}

/// Join a source-relative path with a child name, normalizing separators
pub(crate) fn join_rel(rel_path: &str, name: &str) -> String {
    if rel_path.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", rel_path.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_join_rel() {
        assert_eq!(join_rel("", "parts"), "parts");
        assert_eq!(join_rel("parts", "gearbox"), "parts/gearbox");
        assert_eq!(join_rel("parts/", "gearbox"), "parts/gearbox");
    }

    #[test]
    fn test_factory_builds_matching_variant() {
        let local = from_config(&DataSourceConfig::Local {
            label: "ws".into(),
            path: PathBuf::from("/data"),
        });
        assert_eq!(local.kind(), SourceKind::Local);
        assert_eq!(local.label(), "ws");

        let ftp = from_config(&DataSourceConfig::Ftp {
            label: "archive".into(),
            host: "ftp.example.com".into(),
            port: 21,
            base_dir: "/pub".into(),
            login: "u".into(),
            password: "p".into(),
            passive_mode: true,
        });
        assert_eq!(ftp.kind(), SourceKind::Ftp);
    }

    #[test]
    fn test_copy_controller_flags() {
        let ctrl = CopyController::new();
        assert!(!ctrl.abort_requested());
        ctrl.request_abort();
        assert!(ctrl.abort_requested());
        ctrl.reset();
        assert!(!ctrl.abort_requested());
    }

    #[test]
    fn test_config_round_trip_through_factory() {
        let config = DataSourceConfig::Ftp {
            label: "archive".into(),
            host: "ftp.example.com".into(),
            port: 2121,
            base_dir: "/pub/parts".into(),
            login: "reader".into(),
            password: "pw".into(),
            passive_mode: false,
        };
        let source = from_config(&config);
        assert_eq!(source.config(), config);
    }
}
