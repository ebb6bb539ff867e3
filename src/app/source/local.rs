//! Local-directory data source
//!
//! Listing and copying against a directory on the local filesystem. Copies
//! are chunked so that abort requests take effect between chunks, matching
//! the network backends' checkpoint behavior.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::{DataSourceConfig, SourceKind};
use crate::constants::transfer;
use crate::errors::{SourceError, SourceResult};

use super::{CopyController, CopyOutcome, DataSource, DirEntry};

/// Data source rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalDataSource {
    label: String,
    root: PathBuf,
    concurrency: usize,
}

impl LocalDataSource {
    pub fn new(label: String, root: PathBuf) -> Self {
        Self {
            label,
            root,
            concurrency: transfer::LOCAL_CONCURRENCY,
        }
    }

    /// Override the default concurrency cap
    pub fn with_concurrency(mut self, cap: usize) -> Self {
        self.concurrency = cap.max(1);
        self
    }

    /// Root directory of this source
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, rel_path: &str) -> PathBuf {
        if rel_path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel_path)
        }
    }

    fn map_io(&self, rel_path: &str, err: std::io::Error) -> SourceError {
        if err.kind() == std::io::ErrorKind::NotFound {
            SourceError::not_found(&self.label, rel_path)
        } else {
            SourceError::unavailable(&self.label, err)
        }
    }

    /// Delete files under the source root, given their source-relative
    /// paths. Files already gone are ignored.
    pub async fn delete_files(&self, rel_paths: &[String]) -> SourceResult<usize> {
        let mut deleted = 0;
        for rel in rel_paths {
            match fs::remove_file(self.absolute(rel)).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("File already gone, skipping delete: {}", rel);
                }
                Err(e) => return Err(self.map_io(rel, e)),
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl DataSource for LocalDataSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn source_id(&self) -> String {
        format!("local:{}", self.root.display())
    }

    fn concurrency_limit(&self) -> usize {
        self.concurrency
    }

    fn config(&self) -> DataSourceConfig {
        DataSourceConfig::Local {
            label: self.label.clone(),
            path: self.root.clone(),
        }
    }

    async fn list_children(&self, rel_path: &str) -> SourceResult<Vec<DirEntry>> {
        let dir = self.absolute(rel_path);
        let mut read_dir = fs::read_dir(&dir)
            .await
            .map_err(|e| self.map_io(rel_path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| self.map_io(rel_path, e))?
        {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    // Entry vanished between readdir and stat; keep listing.
                    debug!("Skipping unreadable entry {:?}: {}", entry.file_name(), e);
                    continue;
                }
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        Ok(entries)
    }

    async fn copy_file(
        &self,
        rel_path: &str,
        dest: &Path,
        controller: &Arc<CopyController>,
    ) -> SourceResult<CopyOutcome> {
        let src_path = self.absolute(rel_path);
        let mut src = fs::File::open(&src_path)
            .await
            .map_err(|e| self.map_io(rel_path, e))?;
        let mut out = fs::File::create(dest)
            .await
            .map_err(SourceError::Io)?;

        let mut buf = vec![0u8; transfer::COPY_CHUNK_SIZE];
        let mut written: u64 = 0;

        let result = loop {
            if controller.abort_requested() {
                debug!("Aborted local copy of {} after {} bytes", rel_path, written);
                break Ok(CopyOutcome::Aborted);
            }

            let n = match src.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => break Err(SourceError::Io(e)),
            };
            if n == 0 {
                break match out.flush().await {
                    Ok(()) => Ok(CopyOutcome::Completed { bytes: written }),
                    Err(e) => Err(SourceError::Io(e)),
                };
            }
            if let Err(e) = out.write_all(&buf[..n]).await {
                break Err(SourceError::Io(e));
            }
            written += n as u64;
        };

        // Partial output never survives an abort or a failure.
        if !matches!(&result, Ok(CopyOutcome::Completed { .. })) {
            drop(out);
            if let Err(e) = fs::remove_file(dest).await {
                warn!("Failed to remove partial file {}: {}", dest.display(), e);
            }
        }
        result
    }
}
