//! CLI binary for pdf-bedrock-json.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_bedrock_json::{
    ask, inspect, process_input, DocumentRequest, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, InputSource, ProgressCallback, DEFAULT_MODEL_ID,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Secondary region appended after `AWS_REGION` when `--regions` is not given.
const FALLBACK_REGION: &str = "eu-central-1";

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: std::sync::Mutex<Option<Instant>>,
    unparsed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: std::sync::Mutex::new(None),
            unparsed: AtomicUsize::new(0),
        })
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: usize, total: usize, region: &str, parsed: bool) {
        let secs = self.page_elapsed();
        let mark = if parsed {
            green("✓")
        } else {
            self.unparsed.fetch_add(1, Ordering::SeqCst);
            yellow("~")
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<14}  {}{}",
            mark,
            page,
            total,
            dim(region),
            dim(&format!("{secs:.1}s")),
            if parsed { String::new() } else { yellow("  not JSON") },
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: usize, total: usize, error: &str) {
        let secs = self.page_elapsed();
        let first_line = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total,
            red(first_line),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.abandon();
    }

    fn on_document_complete(&self, total_pages: usize, parsed_pages: usize) {
        self.bar.finish_and_clear();
        let unparsed = self.unparsed.load(Ordering::SeqCst);
        if unparsed == 0 {
            eprintln!(
                "{} {} pages extracted",
                green("✔"),
                bold(&parsed_pages.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages returned JSON  ({} kept as raw text)",
                yellow("⚠"),
                bold(&parsed_pages.to_string()),
                total_pages,
                yellow(&unparsed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every page with the built-in instruction (JSON array on stdout)
  pdf2json invoice.pdf

  # Custom instruction plus a label mapping, written to a file
  pdf2json --prompt-file prompt.txt --mapping-file mapping.xml invoice.pdf -o invoice.json

  # Service-style envelope: {"message": ..., "data": [...]}
  pdf2json --envelope invoice.pdf

  # Full per-page diagnostics (region, attempts, tokens, timings)
  pdf2json --full invoice.pdf

  # Download with basic auth, try eu-west-1 before eu-central-1
  pdf2json --regions eu-west-1,eu-central-1 --http-user svc https://example.com/att.pdf

  # Page count and metadata only (no model call)
  pdf2json --inspect-only invoice.pdf

  # Text-only prompt through the same region failover
  pdf2json --ask "Summarise the purpose of a purchase order in one sentence."

ENVIRONMENT VARIABLES:
  AWS_REGION              First region when --regions is not given
  AWS_PROFILE, AWS_ACCESS_KEY_ID, ...
                          Standard AWS credential chain
  BEDROCK_MODEL_ID        Default model id
  PDF2JSON_REGIONS        Comma-separated region order
  PDF2JSON_MAX_BYTES      Largest accepted document in bytes
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

A .env file in the working directory is loaded before flags are parsed.
"#;

/// Extract structured JSON from PDF pages with Bedrock vision models.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2json",
    version,
    about = "Extract structured JSON from PDF pages with Bedrock vision models",
    long_about = "Rasterise every page of a PDF (local file or URL), send each page image to a \
multimodal model on AWS Bedrock with an extraction instruction, and print one JSON value per \
page. Regions are tried in order until one answers.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "ask")]
    input: Option<String>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "PDF2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Extraction instruction replacing the built-in default.
    #[arg(long, conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Read the extraction instruction from a file.
    #[arg(long, env = "PDF2JSON_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Label mapping appended to the instruction.
    #[arg(long, conflicts_with = "mapping_file")]
    mapping: Option<String>,

    /// Read the label mapping from a file.
    #[arg(long, env = "PDF2JSON_MAPPING_FILE")]
    mapping_file: Option<PathBuf>,

    /// Bedrock model id.
    #[arg(long, env = "BEDROCK_MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    model: String,

    /// Region order, comma-separated. Default: $AWS_REGION then eu-central-1.
    #[arg(long, env = "PDF2JSON_REGIONS", value_delimiter = ',')]
    regions: Vec<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2JSON_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Longest rendered edge in pixels.
    #[arg(long, env = "PDF2JSON_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2JSON_PASSWORD")]
    password: Option<String>,

    /// Max model output tokens per page.
    #[arg(long, env = "PDF2JSON_MAX_TOKENS", default_value_t = 16_000)]
    max_tokens: u32,

    /// Sampling temperature (0.0–1.0). Model default when unset.
    #[arg(long, env = "PDF2JSON_TEMPERATURE")]
    temperature: Option<f32>,

    /// Largest accepted document in bytes.
    #[arg(long, env = "PDF2JSON_MAX_BYTES", default_value_t = 25 * 1024 * 1024)]
    max_bytes: u64,

    /// Basic-auth user for URL inputs.
    #[arg(long, env = "PDF2JSON_HTTP_USER")]
    http_user: Option<String>,

    /// Basic-auth password for URL inputs.
    #[arg(long, env = "PDF2JSON_HTTP_PASSWORD", requires = "http_user")]
    http_password: Option<String>,

    /// Wrap page payloads as {"message": ..., "data": [...]}.
    #[arg(long, conflicts_with = "full")]
    envelope: bool,

    /// Print the full result with per-page diagnostics and stats.
    #[arg(long)]
    full: bool,

    /// Print PDF metadata only, no model call.
    #[arg(long)]
    inspect_only: bool,

    /// Send a text-only prompt instead of processing a PDF.
    #[arg(long, conflicts_with = "inspect_only")]
    ask: Option<String>,

    /// Parent directory for per-request scratch files.
    #[arg(long, env = "PDF2JSON_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "PDF2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2JSON_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-region model call timeout in seconds.
    #[arg(long, env = "PDF2JSON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only && cli.ask.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Text-only prompt ─────────────────────────────────────────────────
    if let Some(ref prompt) = cli.ask {
        let answer = ask(prompt, Some(&cli.model), &config)
            .await
            .context("Prompt failed")?;
        println!("{}", answer.text);
        if !cli.quiet {
            eprintln!(
                "{}",
                dim(&format!(
                    "{} via {}  {} tokens in / {} out",
                    answer.model_id, answer.region, answer.input_tokens, answer.output_tokens
                ))
            );
        }
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input path or URL is required")?;
    let mut source = InputSource::new(input.as_str());
    if let Some(ref user) = cli.http_user {
        source = source.with_basic_auth(user, cli.http_password.clone());
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(source, &config)
            .await
            .context("Failed to inspect PDF")?;
        println!("File:         {}", input);
        if let Some(ref t) = info.title {
            println!("Title:        {}", t);
        }
        if let Some(ref a) = info.author {
            println!("Author:       {}", a);
        }
        println!("Pages:        {}", info.page_count);
        println!("PDF Version:  {}", info.pdf_version);
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let request = build_request(&cli).await?;
    let output = process_input(source, &request, &config)
        .await
        .context("Extraction failed")?;

    let rendered = render_output(&cli, &output)?;
    match cli.output {
        Some(ref path) => write_atomically(path, &rendered).await?,
        None => println!("{rendered}"),
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "   {} pages  {} via fallback region  {} tokens in / {} out  {}ms total",
            stats.total_pages,
            stats.fallback_pages,
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
            stats.total_duration_ms,
        );
        if let Some(ref path) = cli.output {
            eprintln!("   → {}", bold(&path.display().to_string()));
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let regions = if cli.regions.is_empty() {
        default_regions(std::env::var("AWS_REGION").ok())
    } else {
        cli.regions.clone()
    };

    let mut builder = ExtractionConfig::builder()
        .model_id(&cli.model)
        .regions(regions)
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .max_tokens(cli.max_tokens)
        .max_document_bytes(cli.max_bytes)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `[$AWS_REGION, eu-central-1]`; the builder drops the duplicate when they match.
fn default_regions(aws_region: Option<String>) -> Vec<String> {
    let mut regions: Vec<String> = aws_region
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .into_iter()
        .collect();
    if regions.is_empty() {
        regions.push("us-east-1".to_string());
    }
    regions.push(FALLBACK_REGION.to_string());
    regions
}

async fn build_request(cli: &Cli) -> Result<DocumentRequest> {
    let mut request = DocumentRequest::new();
    if let Some(prompt) = read_text_arg(cli.prompt.as_deref(), cli.prompt_file.as_deref()).await? {
        request = request.prompt(prompt);
    }
    if let Some(mapping) =
        read_text_arg(cli.mapping.as_deref(), cli.mapping_file.as_deref()).await?
    {
        request = request.mapping(mapping);
    }
    Ok(request)
}

async fn read_text_arg(inline: Option<&str>, file: Option<&Path>) -> Result<Option<String>> {
    if let Some(text) = inline {
        return Ok(Some(text.to_string()));
    }
    match file {
        Some(path) => Ok(Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))?,
        )),
        None => Ok(None),
    }
}

fn render_output(cli: &Cli, output: &ExtractionOutput) -> Result<String> {
    let value = if cli.full {
        serde_json::to_value(output).context("Failed to serialise output")?
    } else if cli.envelope {
        output.to_envelope()
    } else {
        serde_json::Value::Array(output.payloads())
    };
    serde_json::to_string_pretty(&value).context("Failed to serialise output")
}

/// Write to a temp file beside `path`, then rename over it.
async fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, format!("{contents}\n"))
        .await
        .with_context(|| format!("Failed to write {:?}", tmp_path))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move output into {:?}", path))?;
    Ok(())
}
