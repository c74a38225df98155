//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a document. Callers can forward them
//! to a terminal progress bar, a channel or a job table without the library
//! knowing how the host application reports progress.
//!
//! # Example
//!
//! ```rust
//! use pdf_bedrock_json::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page: usize, total_pages: usize, region: &str, parsed: bool) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} answered by {} (json: {})", page, total_pages, region, parsed);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// Pages are processed one at a time, so events for one document arrive in
/// page order. Different documents may report concurrently through a shared
/// callback, hence `Send + Sync`. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after rasterisation, before the first model call.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the model request is sent for a page.
    fn on_page_start(&self, page: usize, total_pages: usize) {
        let _ = (page, total_pages);
    }

    /// Called when a page has a result.
    ///
    /// `parsed` is `false` when the model answer was not valid JSON; the page
    /// still counts as complete.
    fn on_page_complete(&self, page: usize, total_pages: usize, region: &str, parsed: bool) {
        let _ = (page, total_pages, region, parsed);
    }

    /// Called when every region failed for a page. The document is aborted
    /// right after this event.
    fn on_page_error(&self, page: usize, total_pages: usize, error: &str) {
        let _ = (page, total_pages, error);
    }

    /// Called once after the last page has a result.
    fn on_document_complete(&self, total_pages: usize, parsed_pages: usize) {
        let _ = (total_pages, parsed_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
