//! # pdf-bedrock-json
//!
//! Extract structured JSON from PDF documents, one page at a time, with
//! multimodal models on AWS Bedrock.
//!
//! Each page is rasterised to a PNG and sent to the model together with an
//! extraction instruction. The model is asked for JSON; whatever it returns
//! is parsed into an [`ExtractionResponse`], and answers that are not JSON
//! are kept as a typed failure record instead of aborting the document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Render   rasterise every page via pdfium (spawn_blocking)
//!  ├─ 3. Prompt   default or caller instruction + optional label mapping
//!  ├─ 4. Invoke   Bedrock InvokeModel, regions tried in fixed order
//!  ├─ 5. Parse    strip code fences, strict JSON parse or failure record
//!  └─ 6. Output   ordered per-page results + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_bedrock_json::{process_file, DocumentRequest, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from the standard AWS provider chain.
//!     let config = ExtractionConfig::builder()
//!         .regions(["us-east-1", "eu-central-1"])
//!         .build()?;
//!     let output = process_file("invoice.pdf", &DocumentRequest::new(), &config).await?;
//!     for page in &output.pages {
//!         println!("page {} via {}: {}", page.page, page.region, page.response.to_payload());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2json` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-bedrock-json = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_MODEL_ID};
pub use error::{ExtractError, InvocationError, RegionAttempt, TransportError};
pub use extract::{
    ask, inspect, process_document, process_document_sync, process_file, process_input,
    DocumentRequest,
};
pub use output::{
    DocumentInfo, ExtractionOutput, ExtractionResponse, ExtractionStats, PageResult, PromptAnswer,
};
pub use pipeline::input::InputSource;
pub use pipeline::invoke::{ModelInvoker, ModelTransport};
pub use pipeline::parse::parse_model_output;
pub use pipeline::render::{PageImage, Rasterizer};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::compose;
