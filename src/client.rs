//! Remote conversion service: the trait the engine talks to and its HTTP
//! implementation.
//!
//! The engine never builds requests itself. Everything goes through
//! [`RemoteService`], so tests (and alternative transports) can stand in for
//! the real service. [`HttpRemoteService`] speaks the service's wire format:
//!
//! ```text
//! POST   /upload                      multipart "file"        → {file_id}
//! POST   /convert                     {file_id, target_format, original_name}
//!                                                             → {converted_file_id, converted_filename}
//! GET    /download/{id}_{filename}    raw bytes + content-type
//! GET    /supported-formats           {input_formats, output_formats}
//! DELETE /cleanup/{file_id}           {success, message}
//! ```
//!
//! Failures are normalised into [`RemoteError`]: a FastAPI `{"detail": "…"}`
//! body supplies the message when present, otherwise a per-operation
//! fallback is used.

use crate::catalog::OCTET_STREAM;
use crate::config::ConverterConfig;
use crate::error::{ConverterError, ErrorInfo, RemoteError, RemoteFailure};
use crate::selection::StagedFile;
use crate::task::RemoteArtifact;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const UPLOAD_FAILED: &str = "Upload failed";
const CONVERT_FAILED: &str = "Conversion failed";
const DOWNLOAD_FAILED: &str = "Download failed";
const FORMATS_FAILED: &str = "Could not fetch supported formats";
const CLEANUP_FAILED: &str = "Cleanup failed";

/// Body of `POST /convert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub file_id: String,
    pub target_format: String,
    pub original_name: String,
}

/// Response of `POST /upload`. Only `file_id` is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub file_id: String,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_type: Option<String>,
}

/// Raw answer of the download endpoint, before validation.
///
/// The status is deliberately not checked here: deciding what counts as a
/// valid artifact is the retriever's job.
#[derive(Debug, Clone)]
pub struct DownloadedBody {
    pub status: u16,
    pub content_type: Option<String>,
    /// Length announced by the server, or the byte count read before the
    /// size limit stopped the transfer.
    pub declared_length: Option<u64>,
    pub bytes: Bytes,
}

impl DownloadedBody {
    /// Normalised error for a non-success body.
    pub fn error_info(&self) -> ErrorInfo {
        error_info_from_body(&self.bytes, self.status, DOWNLOAD_FAILED)
    }
}

/// Response of `GET /supported-formats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedFormats {
    pub input_formats: Vec<String>,
    pub output_formats: Vec<String>,
}

/// Response of `DELETE /cleanup/{file_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// The remote upload / convert / download collaborator.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Send the file's bytes; returns the server-side handle.
    async fn upload(&self, file: &StagedFile) -> Result<UploadReceipt, RemoteError>;

    /// Convert a previously uploaded file.
    async fn convert(&self, request: &ConvertRequest) -> Result<RemoteArtifact, RemoteError>;

    /// Fetch a converted artifact.
    async fn download(&self, artifact: &RemoteArtifact) -> Result<DownloadedBody, RemoteError>;

    /// Formats the server claims to accept and produce.
    async fn supported_formats(&self) -> Result<SupportedFormats, RemoteError> {
        Err(unsupported("supported-formats"))
    }

    /// Delete the server-side upload and converted files for `file_id`.
    async fn cleanup(&self, file_id: &str) -> Result<CleanupReport, RemoteError> {
        let _ = file_id;
        Err(unsupported("cleanup"))
    }
}

fn unsupported(operation: &str) -> RemoteError {
    RemoteError::new(
        RemoteFailure::Status(501),
        ErrorInfo::new(format!("'{operation}' is not supported by this service")),
    )
}

/// [`RemoteService`] over HTTP, backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRemoteService {
    client: reqwest::Client,
    base_url: Url,
    download_timeout: Duration,
    max_download_bytes: u64,
}

impl HttpRemoteService {
    pub fn new(config: &ConverterConfig) -> Result<Self, ConverterError> {
        let base_url = config.parsed_base_url()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConverterError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            download_timeout: config.download_timeout(),
            max_download_bytes: config.max_download_bytes,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `segments` below the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::new(
                    RemoteFailure::Network,
                    ErrorInfo::new(format!("'{}' cannot be used as a base URL", self.base_url)),
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn upload(&self, file: &StagedFile) -> Result<UploadReceipt, RemoteError> {
        let url = self.endpoint(&["upload"])?;
        debug!("POST {} ({} bytes, '{}')", url, file.size_bytes, file.name);

        let form = Form::new().part("file", file_part(file));
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(UPLOAD_FAILED, e))?;

        let response = ensure_success(response, UPLOAD_FAILED).await?;
        decode_json(response, UPLOAD_FAILED).await
    }

    async fn convert(&self, request: &ConvertRequest) -> Result<RemoteArtifact, RemoteError> {
        let url = self.endpoint(&["convert"])?;
        debug!(
            "POST {} ({} → {})",
            url, request.original_name, request.target_format
        );

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(CONVERT_FAILED, e))?;

        let response = ensure_success(response, CONVERT_FAILED).await?;
        decode_json(response, CONVERT_FAILED).await
    }

    async fn download(&self, artifact: &RemoteArtifact) -> Result<DownloadedBody, RemoteError> {
        let url = self.endpoint(&["download", &artifact.download_name()])?;
        debug!("GET {}", url);

        let mut response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| transport_error(DOWNLOAD_FAILED, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let declared_length = response.content_length();

        if declared_length.is_some_and(|n| n > self.max_download_bytes) {
            return Ok(DownloadedBody {
                status,
                content_type,
                declared_length,
                bytes: Bytes::new(),
            });
        }

        let mut buf = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error(DOWNLOAD_FAILED, e))?
        {
            buf.extend_from_slice(&chunk);
            if buf.len() as u64 > self.max_download_bytes {
                return Ok(DownloadedBody {
                    status,
                    content_type,
                    declared_length: Some(buf.len() as u64),
                    bytes: Bytes::new(),
                });
            }
        }

        Ok(DownloadedBody {
            status,
            content_type,
            declared_length,
            bytes: buf.freeze(),
        })
    }

    async fn supported_formats(&self) -> Result<SupportedFormats, RemoteError> {
        let url = self.endpoint(&["supported-formats"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(FORMATS_FAILED, e))?;
        let response = ensure_success(response, FORMATS_FAILED).await?;
        decode_json(response, FORMATS_FAILED).await
    }

    async fn cleanup(&self, file_id: &str) -> Result<CleanupReport, RemoteError> {
        let url = self.endpoint(&["cleanup", file_id])?;
        debug!("DELETE {}", url);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| transport_error(CLEANUP_FAILED, e))?;
        let response = ensure_success(response, CLEANUP_FAILED).await?;
        decode_json(response, CLEANUP_FAILED).await
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Multipart part carrying the file. An unparsable MIME hint falls back to
/// `application/octet-stream` rather than failing the upload.
fn file_part(file: &StagedFile) -> Part {
    let mime = file.mime_hint.as_deref().unwrap_or(OCTET_STREAM);
    let part = || Part::bytes(file.content.to_vec()).file_name(file.name.clone());
    match part().mime_str(mime) {
        Ok(p) => p,
        Err(_) => part()
            .mime_str(OCTET_STREAM)
            .unwrap_or_else(|_| part()),
    }
}

fn transport_error(fallback: &str, err: reqwest::Error) -> RemoteError {
    let kind = if err.is_timeout() {
        RemoteFailure::Timeout
    } else if err.is_decode() {
        RemoteFailure::Decode
    } else {
        RemoteFailure::Network
    };
    RemoteError::new(kind, ErrorInfo::new(format!("{fallback}: {err}")))
}

/// Pass 2xx responses through; turn anything else into a `RemoteError`
/// carrying the server's `detail` when it sent one.
async fn ensure_success(response: Response, fallback: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(RemoteError::new(
        RemoteFailure::Status(status.as_u16()),
        error_info_from_body(&body, status.as_u16(), fallback),
    ))
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: Response,
    fallback: &str,
) -> Result<T, RemoteError> {
    response.json::<T>().await.map_err(|e| {
        RemoteError::new(
            RemoteFailure::Decode,
            ErrorInfo::new(format!("{fallback}: unexpected response body ({e})")),
        )
    })
}

fn error_info_from_body(body: &[u8], status: u16, fallback: &str) -> ErrorInfo {
    let fallback = format!("{fallback} (HTTP {status})");
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(payload) => ErrorInfo::from_payload(Some(payload), &fallback),
        Err(_) => {
            let mut info = ErrorInfo::new(fallback);
            let text = String::from_utf8_lossy(body).trim().to_string();
            if !text.is_empty() {
                info.raw = Some(serde_json::Value::String(text));
            }
            info
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str) -> HttpRemoteService {
        let config = ConverterConfig::builder().base_url(base).build().unwrap();
        HttpRemoteService::new(&config).unwrap()
    }

    #[test]
    fn endpoint_joins_below_base() {
        let s = service("http://localhost:8000");
        assert_eq!(
            s.endpoint(&["upload"]).unwrap().as_str(),
            "http://localhost:8000/upload"
        );

        let s = service("http://host/api/");
        assert_eq!(
            s.endpoint(&["convert"]).unwrap().as_str(),
            "http://host/api/convert"
        );
    }

    #[test]
    fn endpoint_percent_encodes_segments() {
        let s = service("http://localhost:8000");
        let url = s
            .endpoint(&["download", "abc_my report?_converted.pdf"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/download/abc_my%20report%3F_converted.pdf"
        );
    }

    #[test]
    fn error_body_with_detail() {
        let info = error_info_from_body(
            r#"{"detail":"Fichier non trouvé"}"#.as_bytes(),
            404,
            "Download failed",
        );
        assert_eq!(info.message, "Fichier non trouvé");
    }

    #[test]
    fn error_body_plain_text() {
        let info = error_info_from_body(b"Internal Server Error", 500, "Conversion failed");
        assert_eq!(info.message, "Conversion failed (HTTP 500)");
        assert_eq!(
            info.raw,
            Some(serde_json::Value::String("Internal Server Error".into()))
        );
    }

    #[test]
    fn error_body_empty() {
        let info = error_info_from_body(b"", 502, "Upload failed");
        assert_eq!(info.message, "Upload failed (HTTP 502)");
        assert!(info.raw.is_none());
    }

    #[test]
    fn upload_receipt_tolerates_extra_fields() {
        let json = r#"{"file_id":"abc","original_name":"a.docx","file_path":"../uploads/abc.docx","file_size":12,"file_type":"docx"}"#;
        let receipt: UploadReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.file_id, "abc");
        assert_eq!(receipt.file_size, Some(12));
    }
}
