//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! Both paths enforce the configured byte ceiling before the whole document
//! is held in memory (file metadata for local files, `Content-Length` and a
//! running count for downloads) and check the `%PDF-` header so callers get
//! a meaningful error rather than a pdfium failure.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Readers must find the header within this many leading bytes.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Credentials for HTTP basic auth on URL inputs.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    /// Local path or `http(s)://` URL.
    pub location: String,
    /// Only used for URL inputs.
    pub auth: Option<BasicAuth>,
}

impl InputSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            auth: None,
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.auth = Some(BasicAuth {
            username: username.into(),
            password,
        });
        self
    }
}

impl From<&str> for InputSource {
    fn from(location: &str) -> Self {
        Self::new(location)
    }
}

impl From<String> for InputSource {
    fn from(location: String) -> Self {
        Self::new(location)
    }
}

/// A PDF held in memory, ready to be written to scratch storage.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name or URL, for messages.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL to validated PDF bytes.
pub async fn resolve_input(
    source: &InputSource,
    config: &ExtractionConfig,
) -> Result<SourceDocument, ExtractError> {
    let location = source.location.trim();
    if location.is_empty() {
        return Err(ExtractError::InvalidInput {
            input: source.location.clone(),
            reason: "empty path or URL".into(),
        });
    }

    let bytes = if is_url(location) {
        download_url(
            location,
            source.auth.as_ref(),
            config.download_timeout_secs,
            config.max_document_bytes,
        )
        .await?
    } else {
        read_local(location, config.max_document_bytes).await?
    };

    check_pdf_header(location, &bytes)?;
    Ok(SourceDocument {
        name: location.to_string(),
        bytes,
    })
}

/// Verify the bytes carry a `%PDF-` header near the start.
pub fn check_pdf_header(source_name: &str, bytes: &[u8]) -> Result<(), ExtractError> {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    if window.windows(5).any(|w| w == b"%PDF-") {
        return Ok(());
    }
    Err(ExtractError::NotAPdf {
        source_name: source_name.to_string(),
        magic: bytes.iter().take(8).copied().collect(),
    })
}

/// Reject documents over the ceiling.
pub fn check_size(source_name: &str, size: u64, limit: u64) -> Result<(), ExtractError> {
    if size > limit {
        return Err(ExtractError::TooLarge {
            source_name: source_name.to_string(),
            size,
            limit,
        });
    }
    Ok(())
}

async fn read_local(path_str: &str, limit: u64) -> Result<Vec<u8>, ExtractError> {
    let path = PathBuf::from(path_str);
    let io_error = |e: std::io::Error, path: PathBuf| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied { path },
        std::io::ErrorKind::NotFound => ExtractError::FileNotFound { path },
        _ => ExtractError::InvalidInput {
            input: path.display().to_string(),
            reason: e.to_string(),
        },
    };

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| io_error(e, path.clone()))?;
    if !meta.is_file() {
        return Err(ExtractError::InvalidInput {
            input: path_str.to_string(),
            reason: "not a regular file".into(),
        });
    }
    check_size(path_str, meta.len(), limit)?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| io_error(e, path.clone()))?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

async fn download_url(
    url: &str,
    auth: Option<&BasicAuth>,
    timeout_secs: u64,
    limit: u64,
) -> Result<Vec<u8>, ExtractError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| ExtractError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let from_reqwest = |e: reqwest::Error| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let mut request = client.get(url);
    if let Some(auth) = auth {
        request = request.basic_auth(&auth.username, auth.password.as_deref());
    }

    let mut response = request.send().await.map_err(from_reqwest)?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    if let Some(len) = response.content_length() {
        check_size(url, len, limit)?;
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(from_reqwest)? {
        bytes.extend_from_slice(&chunk);
        check_size(url, bytes.len() as u64, limit)?;
    }

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes)
}
