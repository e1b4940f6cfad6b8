//! Fetch converted artifacts for completed tasks.
//!
//! The retriever is the only component that talks to the download
//! endpoint. It refuses tasks that are not `Completed` before any network
//! activity, validates what the server sends back, and names the result
//! with a filesystem-safe derivation of the original file name.

use crate::catalog::{mime_for_extension, OCTET_STREAM};
use crate::client::RemoteService;
use crate::config::ConverterConfig;
use crate::error::RetrievalError;
use crate::notify::{NoopNotificationSink, NotificationSink};
use crate::task::{ConversionTask, TaskStatus};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A downloaded artifact, ready to be saved.
#[derive(Debug, Clone)]
pub struct RetrievedArtifact {
    /// Sanitised name, e.g. `report_converted.pdf`.
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl RetrievedArtifact {
    /// Write the artifact into `dir` under [`Self::file_name`].
    ///
    /// Existing files are never replaced: if the name is taken, the first
    /// free `stem (n).ext` is used instead and the returned path says which.
    /// The bytes go to a temporary file first and are renamed into place, so
    /// a failed write never leaves a truncated artifact behind.
    pub async fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf, RetrievalError> {
        let dir = dir.as_ref();
        let write_failed = |path: &Path, source: std::io::Error| RetrievalError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| write_failed(dir, e))?;

        let tmp_path = dir.join(format!(".{}.tmp", self.file_name));
        tokio::fs::write(&tmp_path, &self.bytes)
            .await
            .map_err(|e| write_failed(tmp_path.as_path(), e))?;

        let path = match free_path(dir, &self.file_name).await {
            Ok(path) => path,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(write_failed(dir, e));
            }
        };
        if path.file_name() != Some(std::ffi::OsStr::new(&self.file_name)) {
            debug!("{} exists, saving as {}", self.file_name, path.display());
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_failed(path.as_path(), e));
        }

        Ok(path)
    }
}

/// First path in `dir` that does not exist yet: `name`, then `stem (1).ext`,
/// `stem (2).ext`, …
async fn free_path(dir: &Path, name: &str) -> std::io::Result<PathBuf> {
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (name, String::new()),
    };
    for n in 1u32.. {
        let candidate = dir.join(format!("{stem} ({n}){ext}"));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name for {name}"),
    ))
}

/// Downloads the artifacts of completed tasks.
#[derive(Clone)]
pub struct ResultRetriever {
    service: Arc<dyn RemoteService>,
    sink: Arc<dyn NotificationSink>,
    max_download_bytes: u64,
}

impl ResultRetriever {
    pub fn new(service: Arc<dyn RemoteService>, config: &ConverterConfig) -> Self {
        Self {
            service,
            sink: Arc::new(NoopNotificationSink),
            max_download_bytes: config.max_download_bytes,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Download the artifact of `task`.
    ///
    /// # Errors
    /// - [`RetrievalError::NotCompleted`] if the task is not `Completed`; no
    ///   request is made.
    /// - [`RetrievalError::Status`] unless the server answers exactly `200`.
    /// - [`RetrievalError::TooLarge`] above the configured limit.
    /// - [`RetrievalError::UnexpectedContentType`] when the content type is
    ///   missing, or neither the target's MIME type nor
    ///   `application/octet-stream`.
    pub async fn retrieve(&self, task: &ConversionTask) -> Result<RetrievedArtifact, RetrievalError> {
        match self.fetch(task).await {
            Ok(artifact) => {
                info!("Downloaded {} ({} bytes)", artifact.file_name, artifact.bytes.len());
                self.sink.download_succeeded(&artifact.file_name);
                Ok(artifact)
            }
            Err(e) => {
                warn!("Download of '{}' failed: {}", task.file_name(), e);
                self.sink.download_failed(&e.to_string());
                Err(e)
            }
        }
    }

    /// Download the artifact of `task` and save it into `dir`.
    pub async fn retrieve_to_dir(
        &self,
        task: &ConversionTask,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf, RetrievalError> {
        let artifact = self.fetch(task).await;
        let saved = match artifact {
            Ok(artifact) => artifact.save_to_dir(dir).await,
            Err(e) => Err(e),
        };

        match saved {
            Ok(path) => {
                info!("Saved {}", path.display());
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.sink.download_succeeded(&name);
                Ok(path)
            }
            Err(e) => {
                warn!("Download of '{}' failed: {}", task.file_name(), e);
                self.sink.download_failed(&e.to_string());
                Err(e)
            }
        }
    }

    async fn fetch(&self, task: &ConversionTask) -> Result<RetrievedArtifact, RetrievalError> {
        if task.status() != TaskStatus::Completed {
            return Err(RetrievalError::NotCompleted {
                task_id: task.id().to_string(),
                status: task.status(),
            });
        }
        let remote = task
            .remote_artifact()
            .ok_or_else(|| RetrievalError::MissingArtifact {
                task_id: task.id().to_string(),
            })?;

        debug!("Fetching {}", remote.download_name());
        let body = self.service.download(remote).await?;

        if body.status != 200 {
            return Err(RetrievalError::Status {
                status: body.status,
                message: body.error_info().message,
            });
        }

        if let Some(actual) = body.declared_length {
            if actual > self.max_download_bytes {
                return Err(RetrievalError::TooLarge {
                    limit: self.max_download_bytes,
                    actual,
                });
            }
        }
        let actual = body.bytes.len() as u64;
        if actual > self.max_download_bytes {
            return Err(RetrievalError::TooLarge {
                limit: self.max_download_bytes,
                actual,
            });
        }

        let expected = mime_for_extension(task.to_format());
        let content_type = match body.content_type.as_deref() {
            Some(found) if content_type_matches(found, expected) => found.to_string(),
            found => {
                return Err(RetrievalError::UnexpectedContentType {
                    expected: expected.to_string(),
                    found: found.map(str::to_string),
                })
            }
        };

        Ok(RetrievedArtifact {
            file_name: safe_file_name(task.file_name(), task.to_format()),
            content_type,
            bytes: body.bytes,
        })
    }
}

/// `true` if `found` is `expected` or `application/octet-stream`, ignoring
/// parameters and case.
pub fn content_type_matches(found: &str, expected: &str) -> bool {
    let essence = found
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    !essence.is_empty() && (essence == expected || essence == OCTET_STREAM)
}

/// Local name for the converted artifact of `file_name`.
///
/// Drops the last extension, appends `_converted.<target>` and sanitises
/// the result with [`sanitize_chars`]. A name without a dot has an empty
/// stem: `README` → `_converted.pdf`.
///
/// ```rust
/// use batch_convert::safe_file_name;
///
/// assert_eq!(safe_file_name("report.final.docx", "pdf"), "report.final_converted.pdf");
/// assert_eq!(safe_file_name("my report?.docx", "pdf"), "my report__converted.pdf");
/// ```
pub fn safe_file_name(file_name: &str, target_format: &str) -> String {
    let stem = file_name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or("");
    sanitize_chars(&format!("{stem}_converted.{target_format}"))
}

/// Replace every character outside `[A-Za-z0-9-_. ]` with `_`.
///
/// Characters are counted in UTF-16 code units, so a character outside the
/// Basic Multilingual Plane becomes `__`.
pub fn sanitize_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
            out.push(c);
        } else {
            out.extend(std::iter::repeat('_').take(c.len_utf16()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn safe_name_basic() {
        assert_eq!(safe_file_name("report.docx", "pdf"), "report_converted.pdf");
        assert_eq!(safe_file_name("data.v2.xlsx", "csv"), "data.v2_converted.csv");
    }

    #[test]
    fn safe_name_replaces_unsafe_characters() {
        assert_eq!(
            safe_file_name("весна report?.docx", "pdf"),
            "_____ report__converted.pdf"
        );
        assert_eq!(safe_file_name("a/b\\c.txt", "docx"), "a_b_c_converted.docx");
    }

    #[test]
    fn safe_name_without_dot_has_empty_stem() {
        assert_eq!(safe_file_name("README", "pdf"), "_converted.pdf");
    }

    #[test]
    fn astral_characters_take_two_underscores() {
        assert_eq!(sanitize_chars("a😀b"), "a__b");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for s in ["весна report?", "ok-name_1.pdf", "😀/\\:*", ""] {
            let once = sanitize_chars(s);
            assert_eq!(sanitize_chars(&once), once);
        }
    }

    #[test]
    fn content_type_matching() {
        assert!(content_type_matches("application/pdf", "application/pdf"));
        assert!(content_type_matches("Application/PDF; charset=binary", "application/pdf"));
        assert!(content_type_matches("application/octet-stream", "application/pdf"));
        assert!(!content_type_matches("text/html", "application/pdf"));
        assert!(!content_type_matches("", "application/pdf"));
        assert!(!content_type_matches("application/json", "application/pdf"));
    }

    #[test]
    fn save_to_dir_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = RetrievedArtifact {
            file_name: "a_converted.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: Bytes::from_static(b"%PDF-1.4"),
        };
        let path = tokio_test::block_on(artifact.save_to_dir(dir.path().join("out"))).unwrap();

        assert_eq!(path, dir.path().join("out").join("a_converted.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn save_to_dir_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_converted.pdf"), b"old").unwrap();
        let artifact = RetrievedArtifact {
            file_name: "a_converted.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: Bytes::from_static(b"new"),
        };

        let first = tokio_test::block_on(artifact.save_to_dir(dir.path())).unwrap();
        let second = tokio_test::block_on(artifact.save_to_dir(dir.path())).unwrap();

        assert_eq!(first, dir.path().join("a_converted (1).pdf"));
        assert_eq!(second, dir.path().join("a_converted (2).pdf"));
        assert_eq!(std::fs::read(dir.path().join("a_converted.pdf")).unwrap(), b"old");
        assert_eq!(std::fs::read(&second).unwrap(), b"new");
    }
}
