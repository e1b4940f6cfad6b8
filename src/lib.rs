//! # batch-convert
//!
//! Drive batches of local files through a remote conversion service.
//!
//! ## Why this crate?
//!
//! Converting a handful of office documents, spreadsheets or images through
//! a conversion backend looks simple until one file in the batch is rejected,
//! the service answers with an HTML error page instead of a PDF, or a user
//! picks a target format that makes no sense for half the selection. This
//! crate owns that orchestration: it checks every file against a format
//! catalog, uploads and converts compatible files one at a time, tracks each
//! file through an explicit state machine and validates what comes back
//! before anything is written to disk.
//!
//! ## Pipeline Overview
//!
//! ```text
//! FileSelection
//!  │
//!  ├─ 1. Check    extension vs. target, same category only (catalog)
//!  ├─ 2. Register Pending task in the batch's TaskRegistry
//!  ├─ 3. Upload   POST /upload        → file_id
//!  ├─ 4. Convert  POST /convert       → converted file id + name
//!  ├─ 5. Report   Completed / Error, streamed as BatchEvents
//!  └─ 6. Fetch    GET /download/…     → validated, sanitised, saved
//! ```
//!
//! Files are processed strictly in order; a failing file never stops the
//! batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_convert::{ConversionOrchestrator, ConverterConfig, FileSelection,
//!     HttpRemoteService, RawFile};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConverterConfig::default();
//!     let service = Arc::new(HttpRemoteService::new(&config)?);
//!
//!     let mut selection = FileSelection::new();
//!     selection.add(vec![RawFile::from_path("report.docx").await?]);
//!
//!     let report = ConversionOrchestrator::new(service)
//!         .convert_all_collect(selection.files(), "pdf")
//!         .await?;
//!     eprintln!("{} completed, {} failed, {} skipped",
//!         report.stats.completed, report.stats.failed, report.stats.skipped);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `batchconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! batch-convert = { version = "0.1", default-features = false }
//! ```
//!
//! ## Supported Formats
//!
//! | Category | Extensions |
//! |----------|------------|
//! | Document | `docx`, `txt`, `pdf` |
//! | Spreadsheet | `xlsx`, `csv` |
//! | Image | `jpg`, `jpeg`, `png`, `bmp` |
//!
//! Conversion is only attempted within a category.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod retrieve;
pub mod selection;
pub mod session;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{extension_of, mime_for_extension, Category, FormatCatalog};
pub use client::{
    CleanupReport, ConvertRequest, DownloadedBody, HttpRemoteService, RemoteService,
    SupportedFormats, UploadReceipt,
};
pub use config::{ConverterConfig, ConverterConfigBuilder};
pub use error::{
    ConverterError, ErrorInfo, FileError, RemoteError, RemoteFailure, RetrievalError,
};
pub use notify::{NoopNotificationSink, NotificationSink, SharedSink, TracingNotificationSink};
pub use orchestrator::{Batch, BatchEvent, BatchReport, BatchStats, ConversionOrchestrator, SkippedFile};
pub use retrieve::{safe_file_name, sanitize_chars, ResultRetriever, RetrievedArtifact};
pub use selection::{FileSelection, RawFile, StagedFile};
pub use session::ConverterSession;
pub use task::{ConversionTask, RemoteArtifact, TaskRegistry, TaskStatus, TaskSummary};
