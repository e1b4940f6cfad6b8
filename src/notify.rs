//! Notification sink for user-facing success/failure events.
//!
//! Inject an [`Arc<dyn NotificationSink>`] into the orchestrator, the
//! retriever or the session to receive events as they happen. The engine
//! only *emits* events; showing a toast, printing a line or updating a
//! progress bar is entirely up to the implementation.
//!
//! # Example
//!
//! ```rust
//! use batch_convert::NotificationSink;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingSink {
//!     added: AtomicUsize,
//! }
//!
//! impl NotificationSink for CountingSink {
//!     fn files_added(&self, count: usize) {
//!         self.added.fetch_add(count, Ordering::SeqCst);
//!     }
//! }
//!
//! let sink = Arc::new(CountingSink { added: AtomicUsize::new(0) });
//! sink.files_added(3);
//! assert_eq!(sink.added.load(Ordering::SeqCst), 3);
//! ```

use crate::error::ErrorInfo;
use crate::task::ConversionTask;
use std::sync::Arc;
use tracing::{info, warn};

/// Receives engine events.
///
/// Implementations must be `Send + Sync`: batch events are emitted from the
/// spawned batch driver. All methods have default no-op implementations so
/// callers only override what they care about.
pub trait NotificationSink: Send + Sync {
    /// Files were staged.
    fn files_added(&self, count: usize) {
        let _ = count;
    }

    /// A file was skipped because `to` is not in the category of `from`.
    fn skipped_incompatible(&self, file_name: &str, from: &str, to: &str) {
        let _ = (file_name, from, to);
    }

    /// A file was skipped because its id is already registered in the batch.
    fn skipped_duplicate(&self, file_name: &str) {
        let _ = file_name;
    }

    /// A task reached `Completed`.
    fn conversion_succeeded(&self, task: &ConversionTask) {
        let _ = task;
    }

    /// A task reached `Error`.
    fn conversion_failed(&self, task: &ConversionTask, error: &ErrorInfo) {
        let _ = (task, error);
    }

    /// A converted artifact was fetched; `file_name` is the sanitised name.
    fn download_succeeded(&self, file_name: &str) {
        let _ = file_name;
    }

    /// Fetching a converted artifact failed.
    fn download_failed(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op sink for callers that don't need notifications.
///
/// This is the default everywhere a sink is optional.
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {}

/// Sink that forwards every event to `tracing`.
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn files_added(&self, count: usize) {
        info!("{} file(s) added", count);
    }

    fn skipped_incompatible(&self, file_name: &str, from: &str, to: &str) {
        warn!("Cannot convert {} to {} ({})", from, to, file_name);
    }

    fn skipped_duplicate(&self, file_name: &str) {
        warn!("{} is already part of this batch", file_name);
    }

    fn conversion_succeeded(&self, task: &ConversionTask) {
        info!("{} converted successfully", task.file_name());
    }

    fn conversion_failed(&self, task: &ConversionTask, error: &ErrorInfo) {
        warn!("{}: {}", task.file_name(), error);
    }

    fn download_succeeded(&self, file_name: &str) {
        info!("{} downloaded successfully", file_name);
    }

    fn download_failed(&self, message: &str) {
        warn!("Download failed: {}", message);
    }
}

/// Convenience alias for the shared sink type.
pub type SharedSink = Arc<dyn NotificationSink>;
