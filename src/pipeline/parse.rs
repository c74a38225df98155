//! Response validation: turn raw model text into an [`ExtractionResponse`].
//!
//! Models are asked for bare JSON but sometimes wrap it in a ```` ```json ````
//! fence, prepend a BOM, or introduce the fenced block with a sentence. The
//! rules here undo those habits and then parse strictly. Anything that still
//! is not JSON becomes [`ExtractionResponse::Unparsed`] carrying the original
//! text. Parsing never fails and never panics.
//!
//! Only syntax is checked. Whether the JSON has the fields a consumer needs
//! is the consumer's decision.

use crate::output::ExtractionResponse;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Parse one model answer.
///
/// Candidates tried in order:
/// 1. the trimmed text with an outer code fence removed
/// 2. the first fenced block anywhere in the text, when step 1 did not parse
pub fn parse_model_output(raw: &str) -> ExtractionResponse {
    let cleaned = strip_outer_fence(&remove_invisible_prefix(raw));
    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return ExtractionResponse::Extracted(value);
    }

    if let Some(inner) = first_fenced_block(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(inner) {
            debug!("Recovered JSON from a fenced block inside surrounding prose");
            return ExtractionResponse::Extracted(value);
        }
    }

    debug!("Model output is not valid JSON ({} bytes)", raw.len());
    ExtractionResponse::unparsed(raw)
}

// ── Rule 1: Drop BOM / zero-width characters before the payload ────────────

fn remove_invisible_prefix(input: &str) -> String {
    input
        .trim_start_matches(['\u{FEFF}', '\u{200B}', '\u{2060}'])
        .trim()
        .to_string()
}

// ── Rule 2: Strip an outer code fence ───────────────────────────────────────
//
// The newline after the opener and the closing fence are both optional:
// models emit single-line fences and sometimes stop before closing one.

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[ \t]*(?:[A-Za-z][A-Za-z0-9_+-]*)?[ \t]*\r?\n?(.*?)\s*(?:```)?\s*$").unwrap()
});

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input) {
        Some(caps) => caps[1].trim().to_string(),
        None => input.to_string(),
    }
}

// ── Rule 3: Find a fenced block embedded in prose ───────────────────────────

static RE_INNER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)\s*```").unwrap()
});

fn first_fenced_block(input: &str) -> Option<&str> {
    RE_INNER_FENCE
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

// ── Tests ────────────────────────────────────────────────────────────────────
