//! Error types for the batch-convert library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`ConverterError`]: **Fatal**: the operation cannot proceed at all
//!   (no files selected, no target format, bad configuration). Returned as
//!   `Err(ConverterError)` from the top-level entry points.
//!
//! * [`FileError`]: **Non-fatal**: a single file was skipped or failed
//!   (incompatible format, upload rejected, conversion failed) but the rest
//!   of the batch carries on. Reported through the batch event stream and
//!   stored in [`crate::orchestrator::BatchReport`].
//!
//! * [`RetrievalError`]: downloading a converted artifact failed. The task
//!   itself stays `Completed`, so the caller may simply try again.
//!
//! Every remote failure is normalised into an [`ErrorInfo`] that always
//! carries a displayable message, whether or not the server sent a
//! structured error payload.

use crate::task::TaskStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Message used when neither the payload nor the caller provides one.
const UNKNOWN_ERROR: &str = "Unknown error";

/// All fatal errors returned by the batch-convert library.
///
/// Per-file failures use [`FileError`] and never abort a batch.
#[derive(Debug, Error)]
pub enum ConverterError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// `convert_all` was called with an empty selection.
    #[error("No files selected.\nAdd at least one file before converting.")]
    NoFilesSelected,

    /// `convert_all` was called without a target format.
    #[error("No target format selected.\nChoose one, e.g. --to pdf.")]
    NoTargetFormat,

    // ── Input errors ──────────────────────────────────────────────────────
    /// A file to stage was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// A file to stage exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No task with this id exists in the session.
    #[error("No conversion task with id '{id}'")]
    UnknownTask { id: String },

    // ── Retrieval ─────────────────────────────────────────────────────────
    /// Downloading a converted artifact failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// A call to the conversion service outside a batch failed.
    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConverterError {
    /// `true` for the precondition failures reported before any network
    /// activity takes place.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConverterError::NoFilesSelected | ConverterError::NoTargetFormat
        )
    }
}

/// A normalised error: always a human-readable message, plus the raw
/// structured payload when the server sent one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// An error with only a message. Blank messages are replaced so the
    /// result is always displayable.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            message
        };
        Self { message, raw: None }
    }

    /// Extract a message from a FastAPI-style `{"detail": ...}` payload.
    ///
    /// A string `detail` becomes the message. Anything else (validation
    /// arrays, missing field, non-object body) falls back to `fallback`;
    /// the payload is kept in `raw` either way.
    pub fn from_payload(payload: Option<serde_json::Value>, fallback: &str) -> Self {
        let detail = payload
            .as_ref()
            .and_then(|v| v.get("detail"))
            .and_then(|d| d.as_str())
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let mut info = Self::new(detail.unwrap_or_else(|| fallback.to_string()));
        info.raw = payload;
        info
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// How a remote call failed, independent of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteFailure {
    /// Connection refused, DNS failure, reset, …
    Network,
    /// The request exceeded its timeout.
    Timeout,
    /// The server answered with a non-success status.
    Status(u16),
    /// The response body could not be decoded.
    Decode,
    /// The server answered but reported that the operation did not happen.
    Rejected,
}

/// A failed call to the remote conversion service.
#[derive(Debug, Clone, Error)]
#[error("{info}")]
pub struct RemoteError {
    pub kind: RemoteFailure,
    pub info: ErrorInfo,
}

impl RemoteError {
    pub fn new(kind: RemoteFailure, info: ErrorInfo) -> Self {
        Self { kind, info }
    }

    /// HTTP status code, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            RemoteFailure::Status(code) => Some(code),
            _ => None,
        }
    }
}

/// A non-fatal error for a single file of a batch.
///
/// The batch continues with the next file; only the precondition checks in
/// [`ConverterError`] stop a batch.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FileError {
    /// The target format is not in the source file's category.
    #[error("Cannot convert {} to {to} ('{file}')", display_format(.from))]
    IncompatibleFormat {
        file: String,
        from: String,
        to: String,
    },

    /// The same staged file was submitted twice in one batch.
    #[error("'{file}' was submitted more than once in this batch")]
    DuplicateFile { file: String },

    /// The upload call failed.
    #[error("Upload of '{file}' failed: {info}")]
    Upload { file: String, info: ErrorInfo },

    /// The upload succeeded but the convert call failed.
    #[error("Conversion of '{file}' failed: {info}")]
    Convert { file: String, info: ErrorInfo },
}

impl FileError {
    /// Name of the file this error concerns.
    pub fn file(&self) -> &str {
        match self {
            FileError::IncompatibleFormat { file, .. }
            | FileError::DuplicateFile { file }
            | FileError::Upload { file, .. }
            | FileError::Convert { file, .. } => file,
        }
    }

    /// The normalised remote error, for failures that reached the server.
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            FileError::Upload { info, .. } | FileError::Convert { info, .. } => Some(info),
            _ => None,
        }
    }
}

fn display_format(format: &str) -> &str {
    if format.is_empty() {
        "(no extension)"
    } else {
        format
    }
}

/// Downloading a converted artifact failed.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Only `Completed` tasks have something to download.
    #[error("Task '{task_id}' is {status}; only completed conversions can be downloaded")]
    NotCompleted { task_id: String, status: TaskStatus },

    /// A completed task without a remote artifact reference.
    #[error("Task '{task_id}' has no converted artifact")]
    MissingArtifact { task_id: String },

    /// Network fault, timeout, or unreadable body.
    #[error("Download failed: {0}")]
    Request(RemoteError),

    /// The server answered with anything other than `200 OK`.
    #[error("Download failed with HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The body is not the binary payload we expected.
    #[error(
        "Download returned unexpected content type {} (expected {expected})",
        .found.as_deref().unwrap_or("<none>")
    )]
    UnexpectedContentType {
        expected: String,
        found: Option<String>,
    },

    /// The artifact exceeds the configured download limit.
    #[error("Download too large: {actual} bytes (limit {limit})")]
    TooLarge { limit: u64, actual: u64 },

    /// The artifact could not be written to disk.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<RemoteError> for RetrievalError {
    fn from(err: RemoteError) -> Self {
        match err.kind {
            RemoteFailure::Status(status) => RetrievalError::Status {
                status,
                message: err.info.message,
            },
            _ => RetrievalError::Request(err),
        }
    }
}
