//! Error types for the pdf-bedrock-json library.
//!
//! Two failure families are fatal for a document and surface as
//! `Err(ExtractError)` from the `process_*` entry points:
//!
//! * **Conversion** — the input is not a processable PDF, or it rendered to
//!   zero pages. Bad input; retrying the same request will not help.
//!
//! * **Invocation** — every configured region rejected the model call for a
//!   page (or was unreachable). The service is unavailable; the caller may
//!   retry later. [`InvocationError`] keeps the ordered list of regions that
//!   were tried so the diagnostic survives all the way to the caller.
//!
//! A model answer that is not valid JSON is *not* an error at all. It is
//! recorded as [`crate::output::ExtractionResponse::Unparsed`] inside the
//! page's result and never affects sibling pages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-bedrock-json library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a usable path, URL or prompt.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: Vec<u8> },

    /// The document exceeds the configured byte ceiling.
    #[error("Document '{source_name}' is {size} bytes, over the {limit}-byte limit")]
    TooLarge {
        source_name: String,
        size: u64,
        limit: u64,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened but produced no page images.
    #[error("PDF '{path}' produced no pages")]
    NoPages { path: PathBuf },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library next to the\n\
executable, or install it in a system library directory.\n"
    )]
    PdfiumBindingFailed(String),

    /// The per-request scratch directory could not be created or written.
    #[error("Scratch storage error at '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Model errors ──────────────────────────────────────────────────────
    /// Every configured region failed for one page.
    #[error("Page {page}: {source}")]
    Invocation {
        page: usize,
        #[source]
        source: InvocationError,
    },

    /// A text-only prompt could not be answered by any region.
    #[error(transparent)]
    Prompt(#[from] InvocationError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// `true` when the input document itself is the problem.
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            ExtractError::FileNotFound { .. }
                | ExtractError::PermissionDenied { .. }
                | ExtractError::InvalidInput { .. }
                | ExtractError::DownloadFailed { .. }
                | ExtractError::DownloadTimeout { .. }
                | ExtractError::NotAPdf { .. }
                | ExtractError::TooLarge { .. }
                | ExtractError::CorruptPdf { .. }
                | ExtractError::PasswordRequired { .. }
                | ExtractError::WrongPassword { .. }
                | ExtractError::NoPages { .. }
                | ExtractError::RasterisationFailed { .. }
        )
    }

    /// `true` when no region could serve a model call.
    pub fn is_invocation(&self) -> bool {
        matches!(
            self,
            ExtractError::Invocation { .. } | ExtractError::Prompt(_)
        )
    }

    /// Whether the same request may succeed if repeated later.
    pub fn is_retriable(&self) -> bool {
        self.is_invocation()
            || matches!(
                self,
                ExtractError::DownloadTimeout { .. } | ExtractError::DownloadFailed { .. }
            )
    }

    /// HTTP status a transport layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ExtractError::TooLarge { .. } => 413,
            ExtractError::NotAPdf { .. }
            | ExtractError::CorruptPdf { .. }
            | ExtractError::PasswordRequired { .. }
            | ExtractError::WrongPassword { .. }
            | ExtractError::NoPages { .. }
            | ExtractError::RasterisationFailed { .. } => 422,
            ExtractError::FileNotFound { .. }
            | ExtractError::PermissionDenied { .. }
            | ExtractError::InvalidInput { .. } => 400,
            ExtractError::DownloadFailed { .. } | ExtractError::DownloadTimeout { .. } => 502,
            ExtractError::Invocation { .. } | ExtractError::Prompt(_) => 503,
            _ => 500,
        }
    }
}

/// One attempt against one region, kept for diagnostics.
///
/// Scoped to a single invocation: attempts are never carried across pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAttempt {
    /// Region (endpoint) that was called.
    pub region: String,
    /// Failure description, `None` for the attempt that succeeded.
    pub error: Option<String>,
    /// Wall-clock time spent on this attempt.
    pub elapsed_ms: u64,
}

/// Every configured region was tried for one call, and every one failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationError {
    /// Model that was requested.
    pub model_id: String,
    /// Attempts in the order they were made.
    pub attempts: Vec<RegionAttempt>,
}

impl InvocationError {
    /// Regions tried, in order.
    pub fn regions(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.region.as_str()).collect()
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model '{}' failed in all {} region(s)",
            self.model_id,
            self.attempts.len()
        )?;
        for attempt in &self.attempts {
            write!(
                f,
                "\n  {}: {}",
                attempt.region,
                attempt.error.as_deref().unwrap_or("no error recorded")
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for InvocationError {}

/// Failure of a single call to a single region.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the endpoint at all (DNS, TLS, connection reset).
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The call did not complete in time.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The service answered with an error.
    #[error("service error{}{}: {message}",
        .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default(),
        .code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Service {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// The transport has no client for the requested region.
    #[error("no client configured for region '{0}'")]
    UnknownRegion(String),
}

impl TransportError {
    /// Whether the failure looks temporary (throttling, overload, network).
    ///
    /// Reported in logs only; the invoker never retries the same region.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Unreachable(_) | TransportError::Timeout(_) => true,
            TransportError::Service { status, .. } => {
                matches!(status, Some(408) | Some(429) | Some(500..=599))
            }
            TransportError::UnknownRegion(_) => false,
        }
    }
}
