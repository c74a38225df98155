//! End-to-end integration tests for pdf-bedrock-json.
//!
//! These tests use real PDF files in `./test_cases/`, a real pdfium library
//! and live Bedrock calls. They are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly
//! requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture
//!
//! Region order comes from `PDF2JSON_REGIONS` (comma-separated) when set.

use pdf_bedrock_json::{
    ask, inspect, process_file, DocumentRequest, ExtractionConfig, ExtractionResponse,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn live_config() -> ExtractionConfig {
    let mut builder = ExtractionConfig::builder().dpi(120);
    if let Ok(regions) = std::env::var("PDF2JSON_REGIONS") {
        builder = builder.regions(regions.split(',').map(str::to_string));
    }
    if let Ok(model) = std::env::var("BEDROCK_MODEL_ID") {
        builder = builder.model_id(model);
    }
    builder.build().expect("valid e2e config")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inspect() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.pdf"));
    let info = inspect(path.to_str().unwrap(), &live_config())
        .await
        .expect("inspect");
    println!("{info:?}");
    assert!(info.page_count >= 1);
    assert!(!info.pdf_version.is_empty());
}

#[tokio::test]
async fn test_invoice_extraction() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.pdf"));
    let config = live_config();
    let info = inspect(path.to_str().unwrap(), &config).await.unwrap();

    let output = process_file(&path, &DocumentRequest::new(), &config)
        .await
        .expect("extraction");

    assert_eq!(output.pages.len(), info.page_count);
    for (idx, page) in output.pages.iter().enumerate() {
        assert_eq!(page.page, idx + 1);
        assert!(config.regions.contains(&page.region));
        match &page.response {
            ExtractionResponse::Extracted(value) => {
                println!("page {}: {}", page.page, value);
            }
            ExtractionResponse::Unparsed { raw_response, .. } => {
                println!("page {} not JSON: {}", page.page, raw_response);
            }
        }
    }
    assert!(output.stats.total_output_tokens > 0);
}

#[tokio::test]
async fn test_invoice_with_mapping() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.pdf"));
    let request = DocumentRequest::new().mapping(
        "Invoice No, Inv #, Rechnungsnummer -> invoice_number\nTotal, Amount Due -> total_amount",
    );
    let output = process_file(&path, &request, &live_config())
        .await
        .expect("extraction");

    let first = output.pages[0].response.value().cloned().unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&first).unwrap());
    assert!(output.stats.parsed_pages >= 1);
}

#[tokio::test]
async fn test_ask() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let answer = ask("Reply with the single word: ready", None, &live_config())
        .await
        .expect("ask");
    assert!(!answer.text.trim().is_empty());
}
