//! FTP data source
//!
//! Each operation opens its own control connection inside
//! `spawn_blocking`; the per-source concurrency cap (default one transfer
//! at a time) keeps the number of simultaneous connections within what FTP
//! servers typically allow. Retrieval is streamed in chunks so abort
//! requests take effect between chunks.

use std::io::{Read, Write};
use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use suppaftp::list as ftp_list;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode, Status};
use tracing::{debug, warn};

use crate::config::{DataSourceConfig, SourceKind};
use crate::constants::transfer;
use crate::errors::{SourceError, SourceResult};

use super::{CopyController, CopyOutcome, DataSource, DirEntry};

/// Data source rooted at an FTP account's base directory
#[derive(Debug, Clone)]
pub struct FtpDataSource {
    label: String,
    host: String,
    port: u16,
    base_dir: String,
    login: String,
    password: String,
    passive_mode: bool,
    concurrency: usize,
}

impl FtpDataSource {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        label: String,
        host: String,
        port: u16,
        base_dir: String,
        login: String,
        password: String,
        passive_mode: bool,
    ) -> Self {
        Self {
            label,
            host,
            port,
            base_dir,
            login,
            password,
            passive_mode,
            concurrency: transfer::FTP_CONCURRENCY,
        }
    }

    /// Override the default concurrency cap (some servers permit two data
    /// connections)
    pub fn with_concurrency(mut self, cap: usize) -> Self {
        self.concurrency = cap.max(1);
        self
    }

    /// Open, authenticate and position a control connection. Blocking;
    /// call from `spawn_blocking` only.
    fn connect_blocking(&self) -> SourceResult<FtpStream> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| SourceError::unavailable(&self.label, e))?
            .next()
            .ok_or_else(|| SourceError::unavailable(&self.label, "host resolved to no address"))?;
        let mut stream =
            FtpStream::connect(addr).map_err(|e| SourceError::unavailable(&self.label, e))?;
        stream
            .login(&self.login, &self.password)
            .map_err(|e| SourceError::unavailable(&self.label, e))?;
        stream.set_mode(if self.passive_mode {
            Mode::Passive
        } else {
            Mode::Active
        });
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| SourceError::unavailable(&self.label, e))?;
        if !self.base_dir.is_empty() {
            stream
                .cwd(&self.base_dir)
                .map_err(|e| self.map_ftp(&self.base_dir, e))?;
        }
        Ok(stream)
    }

    fn map_ftp(&self, path: &str, err: FtpError) -> SourceError {
        match &err {
            FtpError::UnexpectedResponse(resp) if resp.status == Status::FileUnavailable => {
                SourceError::not_found(&self.label, path)
            }
            _ => SourceError::unavailable(&self.label, err),
        }
    }

    fn remote_path(&self, rel_path: &str) -> Option<String> {
        if rel_path.is_empty() {
            None
        } else {
            Some(rel_path.to_string())
        }
    }
}

#[async_trait]
impl DataSource for FtpDataSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Ftp
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn source_id(&self) -> String {
        format!(
            "ftp:{}@{}:{}{}",
            self.login, self.host, self.port, self.base_dir
        )
    }

    fn concurrency_limit(&self) -> usize {
        self.concurrency
    }

    fn config(&self) -> DataSourceConfig {
        DataSourceConfig::Ftp {
            label: self.label.clone(),
            host: self.host.clone(),
            port: self.port,
            base_dir: self.base_dir.clone(),
            login: self.login.clone(),
            password: self.password.clone(),
            passive_mode: self.passive_mode,
        }
    }

    async fn list_children(&self, rel_path: &str) -> SourceResult<Vec<DirEntry>> {
        let this = self.clone();
        let rel = rel_path.to_string();

        tokio::task::spawn_blocking(move || {
            let mut stream = this.connect_blocking()?;
            let lines = stream
                .list(this.remote_path(&rel).as_deref())
                .map_err(|e| this.map_ftp(&rel, e))?;
            let _ = stream.quit();

            let mut entries = Vec::with_capacity(lines.len());
            for line in &lines {
                match ftp_list::File::try_from(line.as_str()) {
                    Ok(file) => {
                        // Servers list the dot entries too; they are not
                        // children.
                        if file.name() == "." || file.name() == ".." {
                            continue;
                        }
                        entries.push(DirEntry {
                            name: file.name().to_string(),
                            is_dir: file.is_directory(),
                            size: file.size() as u64,
                            modified: Some(DateTime::<Utc>::from(file.modified())),
                        });
                    }
                    Err(e) => {
                        debug!("Unparseable LIST line '{}': {}", line, e);
                    }
                }
            }
            Ok(entries)
        })
        .await
        .map_err(|e| SourceError::unavailable(&self.label, e))?
    }

    async fn copy_file(
        &self,
        rel_path: &str,
        dest: &Path,
        controller: &Arc<CopyController>,
    ) -> SourceResult<CopyOutcome> {
        let this = self.clone();
        let rel = rel_path.to_string();
        let dest = dest.to_path_buf();
        let controller = Arc::clone(controller);

        tokio::task::spawn_blocking(move || {
            let mut stream = this.connect_blocking()?;
            let mut data = stream
                .retr_as_stream(&rel)
                .map_err(|e| this.map_ftp(&rel, e))?;

            let mut out = std::fs::File::create(&dest).map_err(SourceError::Io)?;
            let mut buf = vec![0u8; transfer::COPY_CHUNK_SIZE];
            let mut written: u64 = 0;

            let result = loop {
                if controller.abort_requested() {
                    debug!("Aborted FTP retrieve of {} after {} bytes", rel, written);
                    break Ok(CopyOutcome::Aborted);
                }
                let n = match data.read(&mut buf) {
                    Ok(n) => n,
                    Err(e) => break Err(SourceError::Io(e)),
                };
                if n == 0 {
                    break match out.flush() {
                        Ok(()) => Ok(CopyOutcome::Completed { bytes: written }),
                        Err(e) => Err(SourceError::Io(e)),
                    };
                }
                if let Err(e) = out.write_all(&buf[..n]) {
                    break Err(SourceError::Io(e));
                }
                written += n as u64;
            };

            if matches!(&result, Ok(CopyOutcome::Completed { .. })) {
                if let Err(e) = stream.finalize_retr_stream(data) {
                    warn!("Failed to finalize FTP retrieve of {}: {}", rel, e);
                }
                let _ = stream.quit();
            } else {
                // Tear the data connection down without draining it, and
                // never leave partial output behind.
                drop(data);
                drop(out);
                let _ = std::fs::remove_file(&dest);
            }
            result
        })
        .await
        .map_err(|e| SourceError::unavailable(&self.label, e))?
    }
}
