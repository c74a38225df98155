//! Result types returned by the extraction entry points.

use crate::error::RegionAttempt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Error marker recorded when a model answer is not valid JSON.
pub const PARSE_FAILURE_MESSAGE: &str = "Model did not return valid JSON.";

/// Outcome of parsing one model answer.
///
/// On the wire this is either the model's own JSON value or
/// `{ "error": ..., "raw_response": ... }`; see [`ExtractionResponse::to_payload`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResponse {
    /// The model answered with valid JSON. Its shape is model-defined.
    Extracted(Value),
    /// The model answered with something else. Not an error: the page still
    /// has a result and sibling pages are unaffected.
    Unparsed { error: String, raw_response: String },
}

impl ExtractionResponse {
    /// Fallback record for a non-JSON answer.
    pub fn unparsed(raw_response: impl Into<String>) -> Self {
        ExtractionResponse::Unparsed {
            error: PARSE_FAILURE_MESSAGE.to_string(),
            raw_response: raw_response.into(),
        }
    }

    pub fn is_extracted(&self) -> bool {
        matches!(self, ExtractionResponse::Extracted(_))
    }

    /// The parsed value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            ExtractionResponse::Extracted(v) => Some(v),
            ExtractionResponse::Unparsed { .. } => None,
        }
    }

    /// Wire-level payload for this page.
    pub fn to_payload(&self) -> Value {
        match self {
            ExtractionResponse::Extracted(v) => v.clone(),
            ExtractionResponse::Unparsed {
                error,
                raw_response,
            } => json!({ "error": error, "raw_response": raw_response }),
        }
    }
}

impl Serialize for ExtractionResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_payload().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExtractionResponse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if let Value::Object(map) = &value {
            if map.len() == 2 {
                if let (Some(Value::String(error)), Some(Value::String(raw))) =
                    (map.get("error"), map.get("raw_response"))
                {
                    if error == PARSE_FAILURE_MESSAGE {
                        return Ok(ExtractionResponse::Unparsed {
                            error: error.clone(),
                            raw_response: raw.clone(),
                        });
                    }
                }
            }
        }
        Ok(ExtractionResponse::Extracted(value))
    }
}

/// Result for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page: usize,
    /// Parsed answer or the typed parse-failure record.
    pub response: ExtractionResponse,
    /// Region that answered.
    pub region: String,
    /// Every region attempt made for this page, in order.
    pub attempts: Vec<RegionAttempt>,
    /// Input tokens reported by the model.
    pub input_tokens: u32,
    /// Output tokens reported by the model.
    pub output_tokens: u32,
    /// Why the model stopped (`end_turn`, `max_tokens`, ...), when reported.
    pub stop_reason: Option<String>,
    /// Wall-clock time for this page (read + invoke + parse).
    pub duration_ms: u64,
}

impl PageResult {
    /// `true` when the answering region was not the first one tried.
    pub fn used_fallback(&self) -> bool {
        self.attempts.len() > 1
    }
}

/// Aggregate statistics for a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub parsed_pages: usize,
    pub unparsed_pages: usize,
    /// Pages answered by a region other than the first.
    pub fallback_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub render_duration_ms: u64,
    pub invoke_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Complete extraction output for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Model that was used for every page.
    pub model_id: String,
    /// Per-page results, in page order.
    pub pages: Vec<PageResult>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// Ordered wire-level payloads, one per page.
    pub fn payloads(&self) -> Vec<Value> {
        self.pages.iter().map(|p| p.response.to_payload()).collect()
    }

    /// Payloads wrapped in the service response envelope.
    pub fn to_envelope(&self) -> Value {
        json!({
            "message": "Data extracted successfully.",
            "data": self.payloads(),
        })
    }
}

/// Facts about a PDF that need no model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub pdf_version: String,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Answer to a text-only prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptAnswer {
    pub model_id: String,
    pub region: String,
    pub text: String,
    pub attempts: Vec<RegionAttempt>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsed_payload_shape() {
        let r = ExtractionResponse::unparsed("not json");
        assert_eq!(
            r.to_payload(),
            json!({ "error": "Model did not return valid JSON.", "raw_response": "not json" })
        );
        assert!(!r.is_extracted());
        assert!(r.value().is_none());
    }

    #[test]
    fn extracted_serialises_as_the_value_itself() {
        let r = ExtractionResponse::Extracted(json!({ "total": 12.5 }));
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"total":12.5}"#);
    }

    #[test]
    fn deserialise_recognises_failure_record() {
        let r: ExtractionResponse = serde_json::from_str(
            r#"{"error":"Model did not return valid JSON.","raw_response":"oops"}"#,
        )
        .unwrap();
        assert_eq!(r, ExtractionResponse::unparsed("oops"));

        // Same keys, different marker: that is model output, not our record.
        let r: ExtractionResponse =
            serde_json::from_str(r#"{"error":"none","raw_response":"x"}"#).unwrap();
        assert!(r.is_extracted());
    }

    #[test]
    fn envelope_wraps_payloads_in_order() {
        let page = |n: usize, response| PageResult {
            page: n,
            response,
            region: "us-east-1".into(),
            attempts: vec![],
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: None,
            duration_ms: 0,
        };
        let out = ExtractionOutput {
            model_id: "m".into(),
            pages: vec![
                page(1, ExtractionResponse::Extracted(json!({ "a": 1 }))),
                page(2, ExtractionResponse::unparsed("nope")),
            ],
            stats: ExtractionStats::default(),
        };
        let env = out.to_envelope();
        assert_eq!(env["message"], "Data extracted successfully.");
        assert_eq!(env["data"][0], json!({ "a": 1 }));
        assert_eq!(env["data"][1]["raw_response"], "nope");
    }
}
