//! Configuration for talking to the remote conversion service.
//!
//! All client behaviour is controlled through [`ConverterConfig`], built via
//! its [`ConverterConfigBuilder`]. Keeping every knob in one struct makes it
//! easy to share one config between the orchestrator and the retriever and to
//! log exactly what a run was configured with.

use crate::error::ConverterError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default service address used by the conversion backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Largest artifact the download endpoint will serve: 100 MiB.
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Configuration for the remote conversion service client.
///
/// Built via [`ConverterConfig::builder()`] or using
/// [`ConverterConfig::default()`].
///
/// # Example
/// ```rust
/// use batch_convert::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .base_url("http://converter.internal:8000")
///     .download_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.download_timeout_secs, 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Base address of the service; endpoints are resolved below it.
    /// Default: `http://localhost:8000`.
    pub base_url: String,

    /// TCP connect timeout in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// Timeout for upload and convert calls in seconds. Default: 120.
    ///
    /// Conversion happens synchronously inside the convert call, so large
    /// office documents need a generous limit.
    pub request_timeout_secs: u64,

    /// Timeout for a single artifact download in seconds. Default: 30.
    pub download_timeout_secs: u64,

    /// Downloads larger than this are rejected. Default: 100 MiB.
    pub max_download_bytes: u64,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            download_timeout_secs: 30,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    /// The parsed base URL.
    pub fn parsed_base_url(&self) -> Result<Url, ConverterError> {
        parse_base_url(&self.base_url)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_download_bytes(mut self, bytes: u64) -> Self {
        self.config.max_download_bytes = bytes;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConverterError> {
        let c = &self.config;
        parse_base_url(&c.base_url)?;
        if c.connect_timeout_secs == 0 || c.request_timeout_secs == 0 || c.download_timeout_secs == 0
        {
            return Err(ConverterError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.max_download_bytes == 0 {
            return Err(ConverterError::InvalidConfig(
                "max_download_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConverterError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConverterError::InvalidConfig(format!("base URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConverterError::InvalidConfig(format!(
            "base URL '{raw}' must use http or https, not '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service() {
        let c = ConverterConfig::default();
        assert_eq!(c.base_url, "http://localhost:8000");
        assert_eq!(c.download_timeout_secs, 30);
        assert_eq!(c.max_download_bytes, 100 * 1024 * 1024);
        assert!(c.user_agent.starts_with("batch-convert/"));
    }

    #[test]
    fn builder_sets_fields() {
        let c = ConverterConfig::builder()
            .base_url("https://convert.example.com/api/")
            .connect_timeout_secs(3)
            .request_timeout_secs(45)
            .max_download_bytes(1024)
            .user_agent("tests")
            .build()
            .unwrap();
        assert_eq!(c.connect_timeout(), Duration::from_secs(3));
        assert_eq!(c.request_timeout(), Duration::from_secs(45));
        assert_eq!(c.max_download_bytes, 1024);
        assert_eq!(c.user_agent, "tests");
        assert_eq!(c.parsed_base_url().unwrap().host_str(), Some("convert.example.com"));
    }

    #[test]
    fn rejects_bad_urls() {
        for bad in ["not a url", "ftp://example.com", ""] {
            let err = ConverterConfig::builder().base_url(bad).build().unwrap_err();
            assert!(matches!(err, ConverterError::InvalidConfig(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn rejects_zero_timeouts_and_limits() {
        assert!(ConverterConfig::builder().download_timeout_secs(0).build().is_err());
        assert!(ConverterConfig::builder().max_download_bytes(0).build().is_err());
    }
}
