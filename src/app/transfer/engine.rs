//! Download queue engine
//!
//! Drains a batch of [`TransferRequest`]s into one target directory.
//! A single drain task launches one worker per active file, capped per
//! data source by that source's concurrency limit. Aborts are
//! cooperative: workers stop at the next copy chunk, interrupted files
//! lose their partial output and return to pending, and a later resume
//! finishes the remainder without duplicating completed files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::app::source::{CopyController, CopyOutcome};
use crate::app::transfer::types::{
    BatchProgress, BatchState, TransferEvent, TransferRequest, TransferState,
};
use crate::constants::transfer as consts;
use crate::errors::{TransferError, TransferResult};

#[derive(Debug)]
struct QueuedFile {
    request: TransferRequest,
    state: TransferState,
}

#[derive(Debug, Default)]
struct EngineState {
    queue: Vec<QueuedFile>,
    target_dir: Option<PathBuf>,
    batch: BatchState,
    subscribers: Vec<mpsc::UnboundedSender<TransferEvent>>,
}

impl EngineState {
    /// Fan an event out to live subscribers, dropping closed ones
    fn emit(&mut self, event: TransferEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_batch(&mut self, state: BatchState) {
        if self.batch != state {
            debug!("Batch state {} -> {}", self.batch, state);
            self.batch = state;
            self.emit(TransferEvent::BatchStateChanged { state });
        }
    }

    fn progress(&self) -> BatchProgress {
        let mut progress = BatchProgress::default();
        for file in &self.queue {
            match file.state {
                TransferState::Pending => progress.pending += 1,
                TransferState::InProgress => progress.in_progress += 1,
                TransferState::Done => progress.done += 1,
                TransferState::Failed => progress.failed += 1,
            }
        }
        progress
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<EngineState>,
    controller: Arc<CopyController>,
    /// Per-source semaphores keyed by source id
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Shared {
    async fn semaphore_for(&self, request: &TransferRequest) -> Arc<Semaphore> {
        let mut semaphores = self.semaphores.lock().await;
        Arc::clone(
            semaphores
                .entry(request.source.source_id())
                .or_insert_with(|| {
                    Arc::new(Semaphore::new(request.source.concurrency_limit().max(1)))
                }),
        )
    }
}

/// The download queue.
///
/// Cheaply cloneable; all clones share the same queue and state.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    shared: Arc<Shared>,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::default()),
                controller: CopyController::new(),
                semaphores: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Attach a listener for progress and error events
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<TransferEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.state.lock().await.subscribers.push(tx);
        rx
    }

    /// Append files to the queue without starting it
    pub async fn enqueue(&self, requests: Vec<TransferRequest>, target_dir: &Path) {
        let mut state = self.shared.state.lock().await;
        state.target_dir = Some(target_dir.to_path_buf());
        for request in requests {
            state.queue.push(QueuedFile {
                request,
                state: TransferState::Pending,
            });
        }
        debug!("Queue now holds {} files", state.queue.len());
    }

    /// Begin draining a fresh batch
    pub async fn start(&self) -> TransferResult<()> {
        self.begin(&[BatchState::Idle, BatchState::Completed]).await
    }

    /// Continue a paused or aborted batch; completed files are not
    /// copied again
    pub async fn resume(&self) -> TransferResult<()> {
        self.begin(&[BatchState::Paused, BatchState::Aborted]).await
    }

    /// Stop launching new transfers; files already in flight finish
    pub async fn pause(&self) -> TransferResult<()> {
        let mut state = self.shared.state.lock().await;
        if state.batch != BatchState::Running {
            return Err(TransferError::InvalidState {
                from: state.batch.to_string(),
                to: BatchState::Paused.to_string(),
            });
        }
        state.set_batch(BatchState::Paused);
        Ok(())
    }

    /// Request a cooperative abort. Workers stop at their next chunk
    /// checkpoint; interrupted files revert to pending with partial
    /// output removed.
    pub async fn abort(&self) -> TransferResult<()> {
        let mut state = self.shared.state.lock().await;
        match state.batch {
            BatchState::Running | BatchState::Paused => {
                self.shared.controller.request_abort();
                state.set_batch(BatchState::Aborted);
                info!("Batch abort requested");
                Ok(())
            }
            other => Err(TransferError::InvalidState {
                from: other.to_string(),
                to: BatchState::Aborted.to_string(),
            }),
        }
    }

    pub async fn batch_state(&self) -> BatchState {
        self.shared.state.lock().await.batch
    }

    pub async fn progress(&self) -> BatchProgress {
        self.shared.state.lock().await.progress()
    }

    /// Per-file states in queue order
    pub async fn file_states(&self) -> Vec<(String, TransferState)> {
        self.shared
            .state
            .lock()
            .await
            .queue
            .iter()
            .map(|f| (f.request.file_name.clone(), f.state))
            .collect()
    }

    async fn begin(&self, allowed_from: &[BatchState]) -> TransferResult<()> {
        let target_dir = {
            let mut state = self.shared.state.lock().await;
            if !allowed_from.contains(&state.batch) {
                return Err(TransferError::InvalidState {
                    from: state.batch.to_string(),
                    to: BatchState::Running.to_string(),
                });
            }
            match state.target_dir.clone() {
                Some(dir) => dir,
                None => {
                    return Err(TransferError::InvalidState {
                        from: state.batch.to_string(),
                        to: BatchState::Running.to_string(),
                    })
                }
            }
        };

        // The whole batch lands in one directory; failing to create it
        // fails the batch once, up front.
        if let Err(e) = tokio::fs::create_dir_all(&target_dir).await {
            let error = TransferError::DirectoryCreateFailed {
                path: target_dir.clone(),
                cause: e.to_string(),
            };
            let mut state = self.shared.state.lock().await;
            state.emit(TransferEvent::BatchError {
                cause: error.to_string(),
            });
            state.set_batch(BatchState::Aborted);
            return Err(error);
        }

        self.shared.controller.reset();
        {
            let mut state = self.shared.state.lock().await;
            state.set_batch(BatchState::Running);
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(drain(shared, target_dir));
        Ok(())
    }
}

/// Drain loop: picks pending files one at a time, waits for the owning
/// source's concurrency slot and hands the copy to a worker task
async fn drain(shared: Arc<Shared>, target_dir: PathBuf) {
    loop {
        let next = {
            let mut state = shared.state.lock().await;
            if state.batch != BatchState::Running {
                break;
            }
            let pending = state
                .queue
                .iter()
                .position(|f| f.state == TransferState::Pending);
            match pending {
                Some(index) => Some((index, state.queue[index].request.clone())),
                None => {
                    let in_flight = state
                        .queue
                        .iter()
                        .any(|f| f.state == TransferState::InProgress);
                    if in_flight {
                        None
                    } else {
                        let progress = state.progress();
                        info!(
                            "Batch completed: {} done, {} failed",
                            progress.done, progress.failed
                        );
                        state.set_batch(BatchState::Completed);
                        break;
                    }
                }
            }
        };

        let Some((index, request)) = next else {
            tokio::time::sleep(consts::DRAIN_POLL_INTERVAL).await;
            continue;
        };

        let semaphore = shared.semaphore_for(&request).await;
        let permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // Re-check after the wait: an abort or a second drain may have
        // claimed the file in the meantime.
        {
            let mut state = shared.state.lock().await;
            if state.batch != BatchState::Running
                || state.queue[index].state != TransferState::Pending
            {
                continue;
            }
            state.queue[index].state = TransferState::InProgress;
            state.emit(TransferEvent::AboutToCopy {
                file_name: request.file_name.clone(),
            });
        }

        let shared = Arc::clone(&shared);
        let dest = target_dir.join(&request.file_name);
        tokio::spawn(async move {
            let _permit = permit;
            let controller = Arc::clone(&shared.controller);
            let result = request
                .source
                .copy_file(&request.rel_path, &dest, &controller)
                .await;

            let mut state = shared.state.lock().await;
            match result {
                Ok(CopyOutcome::Completed { bytes }) => {
                    debug!("Copied {} ({} bytes)", request.file_name, bytes);
                    state.queue[index].state = TransferState::Done;
                    state.emit(TransferEvent::FileCopied {
                        file_name: request.file_name.clone(),
                        local_path: dest,
                    });
                }
                Ok(CopyOutcome::Aborted) => {
                    debug!("Copy of {} interrupted, back to pending", request.file_name);
                    state.queue[index].state = TransferState::Pending;
                }
                Err(e) => {
                    warn!("Copy of {} failed: {}", request.file_name, e);
                    state.queue[index].state = TransferState::Failed;
                    state.emit(TransferEvent::FileError {
                        file_name: request.file_name.clone(),
                        cause: e.to_string(),
                    });
                }
            }
        });
    }
}
