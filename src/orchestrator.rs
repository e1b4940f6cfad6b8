//! Batch conversion: drive every staged file through upload → convert.
//!
//! ## Ordering
//!
//! Files are processed one at a time, in submission order, with at most one
//! request in flight per batch. Every update for file *i* is emitted before
//! the first update for file *i + 1*.
//!
//! ## Streaming vs. eager
//!
//! [`ConversionOrchestrator::convert_all`] spawns a driver task and returns a
//! [`Batch`]: a `Stream` of [`BatchEvent`]s in emission order. The stream
//! ends when the driver is done, and [`Batch::finish`] hands back the final
//! [`BatchReport`] including the task registry. Dropping the stream does not
//! cancel anything: the driver runs the batch to completion and its updates
//! are discarded. [`ConversionOrchestrator::convert_all_collect`] is the
//! eager variant for callers that only want the report.
//!
//! ## Failure isolation
//!
//! Only the precondition check (empty selection, no target format) fails the
//! whole call. Incompatible files are skipped without a task; upload and
//! convert failures move that file's task to `Error` and the batch continues.

use crate::catalog::{extension_of, normalize_extension, FormatCatalog};
use crate::client::{ConvertRequest, RemoteService};
use crate::error::{ConverterError, ErrorInfo, FileError};
use crate::notify::{NoopNotificationSink, NotificationSink};
use crate::selection::StagedFile;
use crate::task::{ConversionTask, InvalidTransition, TaskRegistry, TaskSummary};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// One observable update of a running batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchEvent {
    /// Snapshot of a task right after it was registered or transitioned.
    Task(ConversionTask),
    /// A file that never got a task.
    Skipped(SkippedFile),
}

/// A staged file the batch did not register a task for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file_id: String,
    pub file_name: String,
    pub reason: FileError,
}

/// Aggregate numbers for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Files in the selection.
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Final state of a batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub registry: TaskRegistry,
    pub skipped: Vec<SkippedFile>,
    pub stats: BatchStats,
}

/// A running batch: a stream of [`BatchEvent`]s plus the driver's result.
pub struct Batch {
    events: UnboundedReceiverStream<BatchEvent>,
    driver: JoinHandle<BatchReport>,
}

impl Batch {
    /// Wait for the driver and return the final report.
    ///
    /// Events not yet consumed are discarded.
    pub async fn finish(self) -> Result<BatchReport, ConverterError> {
        drop(self.events);
        self.driver
            .await
            .map_err(|e| ConverterError::Internal(format!("batch driver failed: {e}")))
    }
}

impl Stream for Batch {
    type Item = BatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

/// Drives batches of staged files against a [`RemoteService`].
#[derive(Clone)]
pub struct ConversionOrchestrator {
    service: Arc<dyn RemoteService>,
    sink: Arc<dyn NotificationSink>,
    catalog: FormatCatalog,
}

impl ConversionOrchestrator {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        Self {
            service,
            sink: Arc::new(NoopNotificationSink),
            catalog: FormatCatalog::standard(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_catalog(mut self, catalog: FormatCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    /// Start converting `selection` to `target_format`.
    ///
    /// The target is normalised first: surrounding whitespace and a leading
    /// dot are dropped and it is lowercased, so `" .PDF"` means `pdf`. A
    /// target that is blank after normalising counts as missing.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - [`ConverterError::NoFilesSelected`] / [`ConverterError::NoTargetFormat`]
    ///   when the precondition fails; no remote call is made.
    /// - [`ConverterError::Internal`] when no Tokio runtime is available.
    pub fn convert_all(
        &self,
        selection: &[StagedFile],
        target_format: &str,
    ) -> Result<Batch, ConverterError> {
        let target = validate_request(selection, target_format)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConverterError::Internal(format!("no Tokio runtime: {e}")))?;

        info!(
            "Starting batch: {} file(s) → {}",
            selection.len(),
            target
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let driver = BatchDriver {
            service: Arc::clone(&self.service),
            sink: Arc::clone(&self.sink),
            catalog: self.catalog,
            target,
            registry: TaskRegistry::new(),
            skipped: Vec::new(),
            events: tx,
        };
        let files = selection.to_vec();
        let handle = runtime.spawn(driver.run(files));

        Ok(Batch {
            events: UnboundedReceiverStream::new(rx),
            driver: handle,
        })
    }

    /// Convert `selection` and wait for the whole batch.
    pub async fn convert_all_collect(
        &self,
        selection: &[StagedFile],
        target_format: &str,
    ) -> Result<BatchReport, ConverterError> {
        self.convert_all(selection, target_format)?.finish().await
    }
}

/// Precondition check; returns the normalised target format.
fn validate_request(selection: &[StagedFile], target_format: &str) -> Result<String, ConverterError> {
    if selection.is_empty() {
        return Err(ConverterError::NoFilesSelected);
    }
    let target = normalize_extension(target_format);
    if target.is_empty() {
        return Err(ConverterError::NoTargetFormat);
    }
    Ok(target)
}

/// Owns the registry for the duration of one batch.
struct BatchDriver {
    service: Arc<dyn RemoteService>,
    sink: Arc<dyn NotificationSink>,
    catalog: FormatCatalog,
    target: String,
    registry: TaskRegistry,
    skipped: Vec<SkippedFile>,
    events: mpsc::UnboundedSender<BatchEvent>,
}

impl BatchDriver {
    async fn run(mut self, files: Vec<StagedFile>) -> BatchReport {
        let start = Instant::now();
        let submitted = files.len();

        for file in &files {
            self.process(file).await;
        }

        let TaskSummary {
            completed, failed, ..
        } = self.registry.summary();
        let stats = BatchStats {
            submitted,
            completed,
            failed,
            skipped: self.skipped.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Batch complete: {} completed, {} failed, {} skipped in {}ms",
            stats.completed, stats.failed, stats.skipped, stats.duration_ms
        );

        BatchReport {
            registry: self.registry,
            skipped: self.skipped,
            stats,
        }
    }

    /// Take one file from registration to a terminal state.
    async fn process(&mut self, file: &StagedFile) {
        let from_format = extension_of(&file.name);

        if !self.catalog.is_compatible(&from_format, &self.target) {
            debug!("Skipping '{}': {} → {} unsupported", file.name, from_format, self.target);
            self.sink
                .skipped_incompatible(&file.name, &from_format, &self.target);
            self.skip(
                file,
                FileError::IncompatibleFormat {
                    file: file.name.clone(),
                    from: from_format,
                    to: self.target.clone(),
                },
            );
            return;
        }

        let task = ConversionTask::new(&file.id, &file.name, from_format, &self.target);
        let slot = match self.registry.register(task) {
            Ok(slot) => slot,
            Err(e) => {
                warn!("{}", e);
                self.sink.skipped_duplicate(&file.name);
                self.skip(
                    file,
                    FileError::DuplicateFile {
                        file: file.name.clone(),
                    },
                );
                return;
            }
        };
        self.emit(slot);

        if !self.step(slot, ConversionTask::start) {
            return;
        }

        let receipt = match self.service.upload(file).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.fail(
                    slot,
                    FileError::Upload {
                        file: file.name.clone(),
                        info: e.info,
                    },
                );
                return;
            }
        };
        debug!("Uploaded '{}' as {}", file.name, receipt.file_id);

        let request = ConvertRequest {
            file_id: receipt.file_id,
            target_format: self.target.clone(),
            original_name: file.name.clone(),
        };
        match self.service.convert(&request).await {
            Ok(artifact) => {
                if self.step(slot, |t| t.complete(artifact)) {
                    if let Some(task) = self.registry.slot(slot) {
                        self.sink.conversion_succeeded(task);
                    }
                }
            }
            Err(e) => {
                self.fail(
                    slot,
                    FileError::Convert {
                        file: file.name.clone(),
                        info: e.info,
                    },
                );
            }
        }
    }

    /// Move the task in `slot` to `Error` with the remote failure in `error`.
    fn fail(&mut self, slot: usize, error: FileError) {
        warn!("{}", error);
        let info = error
            .info()
            .cloned()
            .unwrap_or_else(|| ErrorInfo::new(error.to_string()));
        let notify = info.clone();
        if self.step(slot, |t| t.fail(info)) {
            if let Some(task) = self.registry.slot(slot) {
                self.sink.conversion_failed(task, &notify);
            }
        }
    }

    /// Apply a state-machine step to the task in `slot` and publish it.
    /// Returns `false` if the step was rejected.
    fn step<F>(&mut self, slot: usize, transition: F) -> bool
    where
        F: FnOnce(&mut ConversionTask) -> Result<(), InvalidTransition>,
    {
        let Some(task) = self.registry.slot_mut(slot) else {
            error!("No task in slot {}", slot);
            return false;
        };
        match transition(task) {
            Ok(()) => {
                self.emit(slot);
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    fn skip(&mut self, file: &StagedFile, reason: FileError) {
        let skipped = SkippedFile {
            file_id: file.id.clone(),
            file_name: file.name.clone(),
            reason,
        };
        // A closed receiver only means nobody is listening any more.
        let _ = self.events.send(BatchEvent::Skipped(skipped.clone()));
        self.skipped.push(skipped);
    }

    fn emit(&self, slot: usize) {
        if let Some(task) = self.registry.slot(slot) {
            let _ = self.events.send(BatchEvent::Task(task.clone()));
        }
    }
}
