//! A stateful front over the engine: the selection, the chosen target format
//! and every task converted so far.
//!
//! [`ConverterSession`] is what an interactive caller holds on to. It stages
//! files, runs batches through a [`ConversionOrchestrator`], keeps the
//! resulting tasks and downloads their artifacts on demand.
//!
//! # Example
//!
//! ```rust,no_run
//! use batch_convert::{ConverterConfig, ConverterSession, HttpRemoteService, RawFile};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConverterConfig::default();
//!     let service = Arc::new(HttpRemoteService::new(&config)?);
//!     let mut session = ConverterSession::new(service, &config);
//!
//!     session.add_files(vec![RawFile::from_path("report.docx").await?]);
//!     session.set_target_format("pdf");
//!     let stats = session.convert_all().await?;
//!     println!("{} converted", stats.completed);
//!
//!     let id = session.tasks()[0].id().to_string();
//!     let path = session.download(&id, "out").await?;
//!     println!("saved {}", path.display());
//!     Ok(())
//! }
//! ```

use crate::catalog::normalize_extension;
use crate::client::{CleanupReport, RemoteService, SupportedFormats};
use crate::config::ConverterConfig;
use crate::error::{ConverterError, ErrorInfo, RemoteError, RemoteFailure, RetrievalError};
use crate::notify::{NoopNotificationSink, NotificationSink};
use crate::orchestrator::{BatchEvent, BatchStats, ConversionOrchestrator, SkippedFile};
use crate::retrieve::ResultRetriever;
use crate::selection::{FileSelection, RawFile, StagedFile};
use crate::task::{ConversionTask, TaskStatus};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct ConverterSession {
    service: Arc<dyn RemoteService>,
    sink: Arc<dyn NotificationSink>,
    orchestrator: ConversionOrchestrator,
    retriever: ResultRetriever,
    selection: FileSelection,
    target_format: Option<String>,
    tasks: Vec<ConversionTask>,
    skipped: Vec<SkippedFile>,
}

impl ConverterSession {
    pub fn new(service: Arc<dyn RemoteService>, config: &ConverterConfig) -> Self {
        Self {
            orchestrator: ConversionOrchestrator::new(Arc::clone(&service)),
            retriever: ResultRetriever::new(Arc::clone(&service), config),
            service,
            sink: Arc::new(NoopNotificationSink),
            selection: FileSelection::new(),
            target_format: None,
            tasks: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Route every event of this session to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.orchestrator = self.orchestrator.with_sink(Arc::clone(&sink));
        self.retriever = self.retriever.with_sink(Arc::clone(&sink));
        self.sink = sink;
        self
    }

    // ── Selection ────────────────────────────────────────────────────────

    /// Stage `files` and notify the sink.
    pub fn add_files(&mut self, files: Vec<RawFile>) -> Vec<StagedFile> {
        let staged = self.selection.add(files);
        if !staged.is_empty() {
            self.sink.files_added(staged.len());
        }
        staged
    }

    /// Read and stage local files. Nothing is staged if any path fails.
    pub async fn add_paths<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
    ) -> Result<Vec<StagedFile>, ConverterError> {
        let mut raw = Vec::with_capacity(paths.len());
        for path in paths {
            raw.push(RawFile::from_path(path).await?);
        }
        Ok(self.add_files(raw))
    }

    pub fn remove_file(&mut self, file_id: &str) {
        self.selection.remove(file_id);
    }

    pub fn files(&self) -> &[StagedFile] {
        self.selection.files()
    }

    pub fn selection(&self) -> &FileSelection {
        &self.selection
    }

    /// Choose the target format, normalised like
    /// [`normalize_extension`](crate::catalog::normalize_extension):
    /// `" .PDF"` is stored as `pdf`. A blank value clears the choice.
    pub fn set_target_format(&mut self, format: &str) {
        let format = normalize_extension(format);
        self.target_format = (!format.is_empty()).then_some(format);
    }

    pub fn target_format(&self) -> Option<&str> {
        self.target_format.as_deref()
    }

    /// Formats the staged file `file_id` can be converted to, sorted.
    /// Empty for unknown ids and unknown extensions.
    pub fn available_targets(&self, file_id: &str) -> Vec<&'static str> {
        self.selection
            .get(file_id)
            .map(|f| {
                self.orchestrator
                    .catalog()
                    .compatible_targets(&f.extension)
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Conversion ───────────────────────────────────────────────────────

    /// Convert the whole selection, calling `on_event` for every update.
    ///
    /// The batch's tasks are appended to [`Self::tasks`]. The selection is
    /// left as it is.
    pub async fn convert_all_with<F>(&mut self, mut on_event: F) -> Result<BatchStats, ConverterError>
    where
        F: FnMut(&BatchEvent),
    {
        let target = self.target_format.clone().unwrap_or_default();
        let mut batch = self.orchestrator.convert_all(self.selection.files(), &target)?;

        while let Some(event) = batch.next().await {
            on_event(&event);
        }

        let report = batch.finish().await?;
        debug!("Session now holds {} task(s)", self.tasks.len() + report.registry.len());
        self.tasks.extend(report.registry.into_tasks());
        self.skipped.extend(report.skipped);
        Ok(report.stats)
    }

    pub async fn convert_all(&mut self) -> Result<BatchStats, ConverterError> {
        self.convert_all_with(|_| {}).await
    }

    // ── Results ──────────────────────────────────────────────────────────

    /// Every task of every batch, oldest first.
    pub fn tasks(&self) -> &[ConversionTask] {
        &self.tasks
    }

    /// The most recent task with `id`.
    pub fn task(&self, id: &str) -> Option<&ConversionTask> {
        self.tasks.iter().rev().find(|t| t.id() == id)
    }

    /// Files skipped by every batch so far.
    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    /// Download the artifact of task `task_id` into `dir`.
    pub async fn download(
        &self,
        task_id: &str,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf, ConverterError> {
        let task = self.task(task_id).ok_or_else(|| ConverterError::UnknownTask {
            id: task_id.to_string(),
        })?;
        Ok(self.retriever.retrieve_to_dir(task, dir).await?)
    }

    /// Delete the server-side files of a completed task.
    ///
    /// A report with `success: false` is returned as
    /// [`ConverterError::Remote`] with [`RemoteFailure::Rejected`].
    pub async fn cleanup(&self, task_id: &str) -> Result<CleanupReport, ConverterError> {
        let task = self.task(task_id).ok_or_else(|| ConverterError::UnknownTask {
            id: task_id.to_string(),
        })?;
        let artifact = match (task.status(), task.remote_artifact()) {
            (TaskStatus::Completed, Some(artifact)) => artifact,
            (TaskStatus::Completed, None) => {
                return Err(RetrievalError::MissingArtifact {
                    task_id: task_id.to_string(),
                }
                .into())
            }
            (status, _) => {
                return Err(RetrievalError::NotCompleted {
                    task_id: task_id.to_string(),
                    status,
                }
                .into())
            }
        };
        let report = self.service.cleanup(&artifact.converted_file_id).await?;
        if !report.success {
            let message = if report.message.trim().is_empty() {
                "Cleanup failed".to_string()
            } else {
                report.message
            };
            return Err(RemoteError::new(RemoteFailure::Rejected, ErrorInfo::new(message)).into());
        }
        Ok(report)
    }

    /// Formats the service reports it accepts and produces.
    pub async fn supported_formats(&self) -> Result<SupportedFormats, ConverterError> {
        Ok(self.service.supported_formats().await?)
    }

    /// Drop the selection, every task and the chosen target format.
    pub fn clear_all(&mut self) {
        self.selection.clear();
        self.tasks.clear();
        self.skipped.clear();
        self.target_format = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpRemoteService;

    fn session() -> ConverterSession {
        let config = ConverterConfig::default();
        let service = Arc::new(HttpRemoteService::new(&config).unwrap());
        ConverterSession::new(service, &config)
    }

    #[test]
    fn target_format_is_normalised() {
        let mut s = session();
        assert_eq!(s.target_format(), None);
        s.set_target_format(" .PDF");
        assert_eq!(s.target_format(), Some("pdf"));
        s.set_target_format("   ");
        assert_eq!(s.target_format(), None);
    }

    #[test]
    fn available_targets_follow_category() {
        let mut s = session();
        let staged = s.add_files(vec![
            RawFile::new("a.docx", b"x".to_vec(), None),
            RawFile::new("b.xyz", b"x".to_vec(), None),
        ]);
        assert_eq!(s.available_targets(&staged[0].id), vec!["pdf", "txt"]);
        assert!(s.available_targets(&staged[1].id).is_empty());
        assert!(s.available_targets("unknown").is_empty());
    }

    #[test]
    fn clear_all_resets_everything() {
        let mut s = session();
        s.add_files(vec![RawFile::new("a.png", b"x".to_vec(), Some("image/png"))]);
        s.set_target_format("jpg");
        assert_eq!(s.selection().preview_count(), 1);

        s.clear_all();
        assert!(s.files().is_empty());
        assert!(s.tasks().is_empty());
        assert_eq!(s.target_format(), None);
        assert_eq!(s.selection().preview_count(), 0);
    }

    #[tokio::test]
    async fn convert_without_files_is_a_validation_error() {
        let mut s = session();
        s.set_target_format("pdf");
        let err = s.convert_all().await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn download_unknown_task() {
        let s = session();
        let err = s.download("nope", ".").await.unwrap_err();
        assert!(matches!(err, ConverterError::UnknownTask { .. }));
    }
}
