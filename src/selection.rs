//! Staged files awaiting conversion.
//!
//! [`FileSelection`] owns every [`StagedFile`] and every preview resource.
//! A preview is a temporary copy of an image's bytes that a front-end can
//! point at while the file sits in the selection. It is acquired in
//! [`FileSelection::add`] and released deterministically by
//! [`FileSelection::remove`] or [`FileSelection::clear`]. Release consumes the
//! [`PreviewHandle`], so a preview cannot be released twice.

use crate::catalog::extension_of;
use crate::error::ConverterError;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A file handed to the selection: its name, contents and optional MIME type.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub content: Bytes,
    pub mime: Option<String>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>, mime: Option<&str>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            mime: mime.map(str::to_string),
        }
    }

    /// Read a local file, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConverterError> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConverterError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConverterError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string());

        Ok(Self {
            name,
            content: Bytes::from(content),
            mime,
        })
    }
}

/// A file selected locally and not yet submitted. Immutable once staged.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub extension: String,
    pub mime_hint: Option<String>,
    /// Path of the preview resource, for image files.
    pub preview: Option<PathBuf>,
    pub content: Bytes,
}

impl StagedFile {
    pub fn is_image(&self) -> bool {
        is_image_mime(self.mime_hint.as_deref())
    }
}

/// A live preview resource. Dropping it also deletes the file, but the
/// selection always releases explicitly so failures can be logged.
#[derive(Debug)]
pub struct PreviewHandle {
    file: NamedTempFile,
}

impl PreviewHandle {
    fn acquire(extension: &str, content: &[u8]) -> std::io::Result<Self> {
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{extension}")
        };
        let mut file = tempfile::Builder::new()
            .prefix("batchconv-preview-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(content)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the preview file.
    pub fn release(self) -> std::io::Result<()> {
        self.file.close()
    }
}

/// The set of staged files, in the order they were added.
#[derive(Debug, Default)]
pub struct FileSelection {
    files: Vec<StagedFile>,
    previews: HashMap<String, PreviewHandle>,
}

impl FileSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `files`, assigning each a fresh id. Image files get a preview.
    ///
    /// Returns the newly staged files in input order.
    pub fn add(&mut self, files: Vec<RawFile>) -> Vec<StagedFile> {
        let mut staged = Vec::with_capacity(files.len());

        for raw in files {
            let id = uuid::Uuid::new_v4().simple().to_string();
            let extension = extension_of(&raw.name);

            let preview = if is_image_mime(raw.mime.as_deref()) {
                match PreviewHandle::acquire(&extension, &raw.content) {
                    Ok(handle) => {
                        let path = handle.path().to_path_buf();
                        self.previews.insert(id.clone(), handle);
                        Some(path)
                    }
                    Err(e) => {
                        warn!("Could not create preview for '{}': {}", raw.name, e);
                        None
                    }
                }
            } else {
                None
            };

            let file = StagedFile {
                id,
                size_bytes: raw.content.len() as u64,
                name: raw.name,
                extension,
                mime_hint: raw.mime,
                preview,
                content: raw.content,
            };
            debug!("Staged '{}' as {}", file.name, file.id);
            self.files.push(file.clone());
            staged.push(file);
        }

        staged
    }

    /// Remove the file with `id` and release its preview. Unknown ids are
    /// ignored.
    pub fn remove(&mut self, id: &str) {
        let before = self.files.len();
        self.files.retain(|f| f.id != id);
        if self.files.len() != before {
            debug!("Removed staged file {}", id);
        }
        if let Some(handle) = self.previews.remove(id) {
            release_preview(id, handle);
        }
    }

    /// Remove every file and release every preview.
    pub fn clear(&mut self) {
        self.files.clear();
        for (id, handle) in self.previews.drain() {
            release_preview(&id, handle);
        }
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn get(&self, id: &str) -> Option<&StagedFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of preview resources currently held.
    pub fn preview_count(&self) -> usize {
        self.previews.len()
    }
}

impl Drop for FileSelection {
    fn drop(&mut self) {
        self.clear();
    }
}

fn release_preview(id: &str, handle: PreviewHandle) {
    let path = handle.path().to_path_buf();
    if let Err(e) = handle.release() {
        warn!(
            "Failed to release preview {} for {}: {}",
            path.display(),
            id,
            e
        );
    }
}

fn is_image_mime(mime: Option<&str>) -> bool {
    mime.is_some_and(|m| m.trim().to_ascii_lowercase().starts_with("image/"))
}
