//! Document extraction entry points.
//!
//! [`process_document`] is the core: rasterise once, then walk the pages in
//! order, one model call at a time, and collect a [`PageResult`] per page.
//! A page whose answer is not JSON still gets a result. A page that no
//! region could answer aborts the document with [`ExtractError::Invocation`].
//!
//! Pages run sequentially on purpose: the model endpoint has per-account
//! rate limits shared across pages, and only one page image is held in
//! memory at a time.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::{DocumentInfo, ExtractionOutput, ExtractionStats, PageResult, PromptAnswer};
use crate::pipeline::bedrock::BedrockTransport;
use crate::pipeline::input::{self, InputSource};
use crate::pipeline::invoke::{ModelInvoker, ModelTransport};
use crate::pipeline::parse::parse_model_output;
use crate::pipeline::render::{self, PageImage, PdfiumRasterizer, Rasterizer};
use crate::progress::ProgressCallback;
use crate::prompts::{compose_with_default, DEFAULT_INSTRUCTION};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Name of the document copy inside a scratch directory.
const SOURCE_FILE_NAME: &str = "source.pdf";

/// Caller-supplied options for one document.
///
/// All fields are optional: without a prompt the configured default
/// instruction is used, without a model the configured default model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentRequest {
    /// Replaces the default instruction when non-blank.
    pub prompt: Option<String>,
    /// Label-mapping hint appended to the instruction.
    pub mapping: Option<String>,
    /// Overrides the configured model when non-blank.
    pub model_id: Option<String>,
}

impl DocumentRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn mapping(mut self, mapping: impl Into<String>) -> Self {
        self.mapping = Some(mapping.into());
        self
    }

    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Instruction text for every page of this document. Never empty.
    pub fn instruction(&self, config: &ExtractionConfig) -> String {
        compose_with_default(
            config
                .default_instruction
                .as_deref()
                .unwrap_or(DEFAULT_INSTRUCTION),
            self.prompt.as_deref(),
            self.mapping.as_deref(),
        )
    }
}

/// Extract structured JSON from every page of an in-memory PDF.
///
/// The bytes are written to a per-request scratch directory and released
/// before the first model call.
///
/// # Errors
/// - a conversion error when the bytes are not a renderable PDF or produce
///   no pages
/// - [`ExtractError::Invocation`] when every region failed for a page; no
///   further pages are attempted
///
/// Pages whose answer is not valid JSON never cause an error.
///
/// # Example
/// ```rust,no_run
/// use pdf_bedrock_json::{process_document, DocumentRequest, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("invoice.pdf")?;
/// let config = ExtractionConfig::default();
/// let request = DocumentRequest::new().mapping("Inv No -> invoice_number");
/// let output = process_document(bytes, &request, &config).await?;
/// println!("{}", serde_json::to_string_pretty(&output.payloads())?);
/// # Ok(())
/// # }
/// ```
pub async fn process_document(
    pdf_bytes: Vec<u8>,
    request: &DocumentRequest,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();
    let model_id = config.resolve_model(request.model_id.as_deref()).to_string();
    let instruction = request.instruction(config);
    info!(
        "Starting extraction: {} bytes, model {}, regions {:?}",
        pdf_bytes.len(),
        model_id,
        config.regions
    );

    // ── Step 1: Scratch storage ──────────────────────────────────────────
    input::check_pdf_header("<bytes>", &pdf_bytes)?;
    let scratch = create_scratch_dir(config)?;
    let pdf_path = write_source(scratch.path(), pdf_bytes).await?;

    // ── Step 2: Rasterise once ───────────────────────────────────────────
    let render_start = Instant::now();
    let pages = render::rasterize_document(resolve_rasterizer(config), &pdf_path, scratch.path())
        .await?;
    let pages = check_page_sequence(pages, &pdf_path)?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", pages.len(), render_duration_ms);

    // ── Step 3: One model call per page, in order ────────────────────────
    let invoker = ModelInvoker::new(resolve_transport(config).await, config);
    let invoke_start = Instant::now();
    let results = run_pages(
        &pages,
        &instruction,
        &model_id,
        &invoker,
        config.progress_callback.as_ref(),
    )
    .await?;
    let invoke_duration_ms = invoke_start.elapsed().as_millis() as u64;

    // ── Step 4: Scratch cleanup (advisory) ───────────────────────────────
    release_scratch(scratch);

    let stats = compute_stats(
        &results,
        render_duration_ms,
        invoke_duration_ms,
        total_start.elapsed().as_millis() as u64,
    );
    info!(
        "Extraction complete: {} pages, {} parsed, {} unparsed, {}ms total",
        stats.total_pages, stats.parsed_pages, stats.unparsed_pages, stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        model_id,
        pages: results,
        stats,
    })
}

/// Drive one model call per page and collect the results in page order.
///
/// Stops at the first page that no region could answer.
pub async fn run_pages(
    pages: &[PageImage],
    instruction: &str,
    model_id: &str,
    invoker: &ModelInvoker,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<PageResult>, ExtractError> {
    let total = pages.len();
    if let Some(cb) = progress {
        cb.on_document_start(total);
    }

    let mut results = Vec::with_capacity(total);
    for image in pages {
        let page_start = Instant::now();
        if let Some(cb) = progress {
            cb.on_page_start(image.page, total);
        }

        let bytes = image.read_bytes().await?;
        let invocation = match invoker
            .invoke(&bytes, &image.media_type, instruction, model_id)
            .await
        {
            Ok(inv) => inv,
            Err(source) => {
                warn!("Page {}/{}: every region failed", image.page, total);
                if let Some(cb) = progress {
                    cb.on_page_error(image.page, total, &source.to_string());
                }
                return Err(ExtractError::Invocation {
                    page: image.page,
                    source,
                });
            }
        };
        drop(bytes);
        discard_page_image(image).await;

        let response = parse_model_output(&invocation.text);
        let parsed = response.is_extracted();
        if parsed {
            info!("Page {}/{}: JSON from {}", image.page, total, invocation.region);
        } else {
            info!(
                "Page {}/{}: answer from {} was not valid JSON",
                image.page, total, invocation.region
            );
        }
        if let Some(cb) = progress {
            cb.on_page_complete(image.page, total, &invocation.region, parsed);
        }

        results.push(PageResult {
            page: image.page,
            response,
            region: invocation.region,
            attempts: invocation.attempts,
            input_tokens: invocation.input_tokens,
            output_tokens: invocation.output_tokens,
            stop_reason: invocation.stop_reason,
            duration_ms: page_start.elapsed().as_millis() as u64,
        });
    }

    if let Some(cb) = progress {
        let parsed_pages = results.iter().filter(|r| r.response.is_extracted()).count();
        cb.on_document_complete(total, parsed_pages);
    }
    Ok(results)
}

/// Extract from a local PDF file.
pub async fn process_file(
    path: impl AsRef<Path>,
    request: &DocumentRequest,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let source = InputSource::new(path.as_ref().to_string_lossy());
    process_input(source, request, config).await
}

/// Extract from a local path or an HTTP(S) URL.
pub async fn process_input(
    source: impl Into<InputSource>,
    request: &DocumentRequest,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let document = input::resolve_input(&source.into(), config).await?;
    debug!("Resolved {} ({} bytes)", document.name, document.bytes.len());
    process_document(document.bytes, request, config).await
}

/// Synchronous wrapper around [`process_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_document_sync(
    pdf_bytes: Vec<u8>,
    request: &DocumentRequest,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_document(pdf_bytes, request, config))
}

/// Send a text-only prompt through the same region failover.
pub async fn ask(
    prompt: &str,
    model_id: Option<&str>,
    config: &ExtractionConfig,
) -> Result<PromptAnswer, ExtractError> {
    if prompt.trim().is_empty() {
        return Err(ExtractError::InvalidInput {
            input: prompt.to_string(),
            reason: "prompt must not be empty".into(),
        });
    }
    let model_id = config.resolve_model(model_id).to_string();
    let invoker = ModelInvoker::new(resolve_transport(config).await, config);
    let invocation = invoker.invoke_text(prompt, &model_id).await?;

    Ok(PromptAnswer {
        model_id,
        region: invocation.region,
        text: invocation.text,
        attempts: invocation.attempts,
        input_tokens: invocation.input_tokens,
        output_tokens: invocation.output_tokens,
    })
}

/// Page count and metadata, without any model call.
pub async fn inspect(
    source: impl Into<InputSource>,
    config: &ExtractionConfig,
) -> Result<DocumentInfo, ExtractError> {
    let document = input::resolve_input(&source.into(), config).await?;
    let scratch = create_scratch_dir(config)?;
    let pdf_path = write_source(scratch.path(), document.bytes).await?;
    let info = render::inspect_document(resolve_rasterizer(config), &pdf_path).await;
    release_scratch(scratch);
    info
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn resolve_rasterizer(config: &ExtractionConfig) -> Arc<dyn Rasterizer> {
    match &config.rasterizer {
        Some(r) => Arc::clone(r),
        None => Arc::new(PdfiumRasterizer::from_config(config)),
    }
}

/// The injected transport, or the config's shared Bedrock transport.
///
/// The Bedrock clients are built on the first call and reused by every later
/// document and prompt processed with this config or a clone of it.
async fn resolve_transport(config: &ExtractionConfig) -> Arc<dyn ModelTransport> {
    if let Some(t) = &config.transport {
        return Arc::clone(t);
    }
    let shared = config
        .default_transport
        .get_or_init(|| async {
            info!("Creating Bedrock clients for {:?}", config.regions);
            let transport: Arc<dyn ModelTransport> =
                Arc::new(BedrockTransport::new(&config.regions, config.api_timeout_secs).await);
            transport
        })
        .await;
    Arc::clone(shared)
}

/// A uniquely named directory per request, so concurrent documents never
/// share file names.
fn create_scratch_dir(config: &ExtractionConfig) -> Result<TempDir, ExtractError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("pdf2json-");
    let result = match &config.scratch_dir {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    };
    result.map_err(|source| ExtractError::Scratch {
        path: config
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir),
        source,
    })
}

/// Write the document into scratch storage; the bytes are dropped here.
async fn write_source(dir: &Path, pdf_bytes: Vec<u8>) -> Result<PathBuf, ExtractError> {
    let path = dir.join(SOURCE_FILE_NAME);
    tokio::fs::write(&path, &pdf_bytes)
        .await
        .map_err(|source| ExtractError::Scratch {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Each page image is sent once; remove it as soon as it has been.
async fn discard_page_image(image: &PageImage) {
    if let Err(e) = tokio::fs::remove_file(&image.path).await {
        debug!("Could not remove {}: {}", image.path.display(), e);
    }
}

fn release_scratch(scratch: TempDir) {
    let path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!("Scratch cleanup failed for {}: {}", path.display(), e);
    }
}

/// Rasterisers must yield pages 1..=n with no gaps or duplicates.
fn check_page_sequence(
    mut pages: Vec<PageImage>,
    pdf_path: &Path,
) -> Result<Vec<PageImage>, ExtractError> {
    if pages.is_empty() {
        return Err(ExtractError::NoPages {
            path: pdf_path.to_path_buf(),
        });
    }
    pages.sort_by_key(|p| p.page);
    for (idx, page) in pages.iter().enumerate() {
        if page.page != idx + 1 {
            return Err(ExtractError::Internal(format!(
                "rasteriser returned page {} at position {}",
                page.page,
                idx + 1
            )));
        }
    }
    Ok(pages)
}

fn compute_stats(
    pages: &[PageResult],
    render_duration_ms: u64,
    invoke_duration_ms: u64,
    total_duration_ms: u64,
) -> ExtractionStats {
    let parsed_pages = pages.iter().filter(|p| p.response.is_extracted()).count();
    ExtractionStats {
        total_pages: pages.len(),
        parsed_pages,
        unparsed_pages: pages.len() - parsed_pages,
        fallback_pages: pages.iter().filter(|p| p.used_fallback()).count(),
        total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
        total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
        render_duration_ms,
        invoke_duration_ms,
        total_duration_ms,
    }
}
