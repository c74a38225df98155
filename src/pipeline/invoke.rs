//! Model invocation: build the multimodal request and walk the region list.
//!
//! One request body is built per call and sent to each configured region in
//! fixed priority order. The first region that answers with a well-formed
//! envelope wins; every failure before it is kept as a [`RegionAttempt`] so
//! the caller can see exactly which regions were tried and why they failed.
//!
//! ## Failover policy
//!
//! - regions are tried in configuration order, never shuffled
//! - each region gets exactly one attempt per call; there is no same-region
//!   retry and no backoff
//! - a timed-out attempt counts as that region's failure
//! - a response body that is not a valid Anthropic envelope also counts as a
//!   failure, and the next region is tried
//! - nothing carries over between calls: every page starts again at the
//!   first region
//!
//! The network call itself sits behind [`ModelTransport`] so tests can
//! script per-region behaviour without AWS.

use crate::config::ExtractionConfig;
use crate::error::{InvocationError, RegionAttempt, TransportError};
use crate::pipeline::encode::to_base64;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sends one serialized request body to one region.
///
/// Implementations make exactly one call and must not retry internally.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Invoke `model_id` in `region` and return the raw response body.
    async fn invoke_model(
        &self,
        region: &str,
        model_id: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError>;
}

/// A successful model call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Concatenated text blocks of the answer, untouched.
    pub text: String,
    /// Region that answered.
    pub region: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub stop_reason: Option<String>,
    /// Every attempt made, ending with the successful one.
    pub attempts: Vec<RegionAttempt>,
}

/// Drives one model call across the configured regions.
#[derive(Clone)]
pub struct ModelInvoker {
    transport: Arc<dyn ModelTransport>,
    regions: Vec<String>,
    anthropic_version: String,
    max_tokens: u32,
    text_max_tokens: u32,
    temperature: Option<f32>,
    attempt_timeout: Duration,
}

impl ModelInvoker {
    pub fn new(transport: Arc<dyn ModelTransport>, config: &ExtractionConfig) -> Self {
        Self {
            transport,
            regions: config.regions.clone(),
            anthropic_version: config.anthropic_version.clone(),
            max_tokens: config.max_tokens,
            text_max_tokens: config.text_max_tokens,
            temperature: config.temperature,
            attempt_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Override the per-attempt timeout. `Duration::ZERO` disables it.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Send one page image plus its instruction.
    ///
    /// Fails only after every configured region has been tried.
    pub async fn invoke(
        &self,
        image: &[u8],
        media_type: &str,
        instruction: &str,
        model_id: &str,
    ) -> Result<Invocation, InvocationError> {
        let body = self.image_request_body(image, media_type, instruction);
        debug!(
            "Request for {}: {} bytes image, {} bytes body",
            model_id,
            image.len(),
            body.len()
        );
        self.call_with_failover(model_id, body).await
    }

    /// Send a text-only prompt, using the smaller text token budget.
    pub async fn invoke_text(
        &self,
        prompt: &str,
        model_id: &str,
    ) -> Result<Invocation, InvocationError> {
        let body = self.text_request_body(prompt);
        self.call_with_failover(model_id, body).await
    }

    /// Anthropic messages body with the image part first, then the text part.
    pub fn image_request_body(&self, image: &[u8], media_type: &str, instruction: &str) -> Vec<u8> {
        let content = json!([
            {
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": to_base64(image),
                }
            },
            { "type": "text", "text": instruction }
        ]);
        self.request_body(self.max_tokens, content)
    }

    pub fn text_request_body(&self, prompt: &str) -> Vec<u8> {
        let content = json!([{ "type": "text", "text": prompt }]);
        self.request_body(self.text_max_tokens, content)
    }

    fn request_body(&self, max_tokens: u32, content: Value) -> Vec<u8> {
        let mut request = json!({
            "anthropic_version": self.anthropic_version,
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": content }],
        });
        if let (Some(t), Some(obj)) = (self.temperature, request.as_object_mut()) {
            obj.insert("temperature".into(), json!(wire_temperature(t)));
        }
        request.to_string().into_bytes()
    }

    /// Plain ordered loop: first success returns, failures accumulate.
    async fn call_with_failover(
        &self,
        model_id: &str,
        body: Vec<u8>,
    ) -> Result<Invocation, InvocationError> {
        let mut attempts: Vec<RegionAttempt> = Vec::with_capacity(self.regions.len());

        for region in &self.regions {
            let started = Instant::now();
            let outcome = self
                .attempt(region, model_id, body.clone())
                .await
                .and_then(|bytes| decode_envelope(&bytes));
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(reply) => {
                    attempts.push(RegionAttempt {
                        region: region.clone(),
                        error: None,
                        elapsed_ms,
                    });
                    debug!(
                        "{} answered in {}ms: {} input tokens, {} output tokens, stop={:?}",
                        region, elapsed_ms, reply.input_tokens, reply.output_tokens, reply.stop_reason
                    );
                    return Ok(Invocation {
                        text: reply.text,
                        region: region.clone(),
                        input_tokens: reply.input_tokens,
                        output_tokens: reply.output_tokens,
                        stop_reason: reply.stop_reason,
                        attempts,
                    });
                }
                Err(failure) => {
                    warn!(
                        region = %region,
                        model = %model_id,
                        transient = failure.transient,
                        "Region attempt failed after {}ms: {}",
                        elapsed_ms,
                        failure.detail
                    );
                    attempts.push(RegionAttempt {
                        region: region.clone(),
                        error: Some(failure.detail),
                        elapsed_ms,
                    });
                }
            }
        }

        Err(InvocationError {
            model_id: model_id.to_string(),
            attempts,
        })
    }

    async fn attempt(
        &self,
        region: &str,
        model_id: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, AttemptFailure> {
        let call = self.transport.invoke_model(region, model_id, body);
        let result = if self.attempt_timeout.is_zero() {
            call.await
        } else {
            match tokio::time::timeout(self.attempt_timeout, call).await {
                Ok(r) => r,
                Err(_) => Err(TransportError::Timeout(self.attempt_timeout.as_secs())),
            }
        };
        result.map_err(AttemptFailure::from)
    }
}

/// Why one region attempt did not produce a usable answer.
struct AttemptFailure {
    detail: String,
    transient: bool,
}

impl From<TransportError> for AttemptFailure {
    fn from(e: TransportError) -> Self {
        Self {
            transient: e.is_transient(),
            detail: e.to_string(),
        }
    }
}

// ── Response envelope ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

struct Reply {
    text: String,
    input_tokens: u32,
    output_tokens: u32,
    stop_reason: Option<String>,
}

/// Unwrap the Anthropic envelope down to the answer text.
fn decode_envelope(bytes: &[u8]) -> Result<Reply, AttemptFailure> {
    let malformed = |detail: String| AttemptFailure {
        detail: format!("malformed response envelope: {detail}"),
        transient: false,
    };

    let envelope: ResponseEnvelope =
        serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;

    let texts: Vec<String> = envelope
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text),
            ResponseBlock::Other => None,
        })
        .collect();
    if texts.is_empty() {
        return Err(malformed("no text content block".into()));
    }

    let usage = envelope.usage.unwrap_or_default();
    Ok(Reply {
        text: texts.concat(),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        stop_reason: envelope.stop_reason,
    })
}

/// Widen through the shortest decimal form so `0.3` is sent as `0.3`,
/// not as the nearest `f64` to the `f32` value.
fn wire_temperature(t: f32) -> f64 {
    t.to_string().parse().unwrap_or_else(|_| f64::from(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Per-region scripted answers; records every call in order.
    #[derive(Default)]
    struct Scripted {
        answers: HashMap<String, Result<Vec<u8>, TransportError>>,
        slow: Option<String>,
        calls: Mutex<Vec<String>>,
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    impl Scripted {
        fn answer(mut self, region: &str, text: &str) -> Self {
            self.answers.insert(region.into(), Ok(envelope(text)));
            self
        }

        fn raw(mut self, region: &str, body: &[u8]) -> Self {
            self.answers.insert(region.into(), Ok(body.to_vec()));
            self
        }

        fn fail(mut self, region: &str, e: TransportError) -> Self {
            self.answers.insert(region.into(), Err(e));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelTransport for Scripted {
        async fn invoke_model(
            &self,
            region: &str,
            _model_id: &str,
            body: Vec<u8>,
        ) -> Result<Vec<u8>, TransportError> {
            self.calls.lock().unwrap().push(region.to_string());
            self.bodies.lock().unwrap().push(body);
            if self.slow.as_deref() == Some(region) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.answers
                .get(region)
                .cloned()
                .unwrap_or_else(|| Err(TransportError::UnknownRegion(region.into())))
        }
    }

    fn envelope(text: &str) -> Vec<u8> {
        json!({
            "content": [{ "type": "text", "text": text }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 1200, "output_tokens": 80 }
        })
        .to_string()
        .into_bytes()
    }

    fn invoker(transport: Arc<Scripted>, regions: &[&str]) -> ModelInvoker {
        let config = ExtractionConfig::builder()
            .regions(regions.iter().copied())
            .build()
            .unwrap();
        ModelInvoker::new(transport, &config)
    }

    fn throttled() -> TransportError {
        TransportError::Service {
            status: Some(429),
            code: Some("ThrottlingException".into()),
            message: "Too many requests".into(),
        }
    }

    #[tokio::test]
    async fn first_region_success_short_circuits() {
        let t = Arc::new(Scripted::default().answer("a", "{}").answer("b", "{}"));
        let inv = invoker(t.clone(), &["a", "b"])
            .invoke(b"png", "image/png", "extract", "m")
            .await
            .unwrap();
        assert_eq!(inv.region, "a");
        assert_eq!(inv.attempts.len(), 1);
        assert_eq!(t.calls(), vec!["a"]);
        assert_eq!(inv.input_tokens, 1200);
        assert_eq!(inv.stop_reason.as_deref(), Some("end_turn"));
    }

    #[tokio::test]
    async fn failing_region_falls_through_in_order_every_call() {
        let t = Arc::new(Scripted::default().fail("a", throttled()).answer("b", "ok"));
        let invoker = invoker(t.clone(), &["a", "b"]);

        for _ in 0..3 {
            let inv = invoker.invoke(b"x", "image/png", "p", "m").await.unwrap();
            assert_eq!(inv.region, "b");
            assert_eq!(inv.text, "ok");
            assert_eq!(inv.attempts[0].region, "a");
            assert!(inv.attempts[0].error.as_deref().unwrap().contains("429"));
            assert_eq!(inv.attempts[1].error, None);
        }
        assert_eq!(t.calls(), vec!["a", "b", "a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn all_regions_failing_aggregates_attempts() {
        let t = Arc::new(
            Scripted::default()
                .fail("a", TransportError::Unreachable("dns".into()))
                .fail("b", throttled()),
        );
        let err = invoker(t.clone(), &["a", "b", "c"])
            .invoke(b"x", "image/png", "p", "m")
            .await
            .unwrap_err();
        assert_eq!(err.model_id, "m");
        assert_eq!(err.regions(), vec!["a", "b", "c"]);
        assert!(err.attempts.iter().all(|a| a.error.is_some()));
        assert!(err.attempts[2].error.as_deref().unwrap().contains("no client"));
        assert_eq!(t.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn malformed_envelope_moves_to_next_region() {
        let t = Arc::new(
            Scripted::default()
                .raw("a", b"<html>gateway</html>")
                .raw("b", br#"{"content": [{"type": "tool_use", "id": "x"}]}"#)
                .answer("c", "fine"),
        );
        let inv = invoker(t, &["a", "b", "c"])
            .invoke(b"x", "image/png", "p", "m")
            .await
            .unwrap();
        assert_eq!(inv.region, "c");
        assert!(inv.attempts[0].error.as_deref().unwrap().contains("malformed"));
        assert!(inv.attempts[1]
            .error
            .as_deref()
            .unwrap()
            .contains("no text content block"));
    }

    #[tokio::test]
    async fn timed_out_attempt_counts_as_failure() {
        let mut scripted = Scripted::default().answer("slow", "late").answer("fast", "{}");
        scripted.slow = Some("slow".into());
        let t = Arc::new(scripted);
        let inv = invoker(t, &["slow", "fast"])
            .with_attempt_timeout(Duration::from_millis(50))
            .invoke(b"x", "image/png", "p", "m")
            .await
            .unwrap();
        assert_eq!(inv.region, "fast");
        assert!(inv.attempts[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn image_body_has_image_then_text() {
        let t = Arc::new(Scripted::default().answer("a", "{}"));
        invoker(t.clone(), &["a"])
            .invoke(b"hello", "image/png", "Extract it", "m")
            .await
            .unwrap();

        let body: Value = serde_json::from_slice(&t.bodies.lock().unwrap()[0]).unwrap();
        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(body["max_tokens"], 16_000);
        assert!(body.get("temperature").is_none());
        let msg = &body["messages"][0];
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"][0]["type"], "image");
        assert_eq!(msg["content"][0]["source"]["type"], "base64");
        assert_eq!(msg["content"][0]["source"]["media_type"], "image/png");
        assert_eq!(msg["content"][0]["source"]["data"], "aGVsbG8=");
        assert_eq!(msg["content"][1], json!({ "type": "text", "text": "Extract it" }));
    }

    #[tokio::test]
    async fn temperature_keeps_its_decimal_form_on_the_wire() {
        let t = Arc::new(Scripted::default().answer("a", "{}"));
        let config = ExtractionConfig::builder()
            .regions(["a"])
            .temperature(0.3)
            .build()
            .unwrap();
        ModelInvoker::new(t.clone(), &config)
            .invoke(b"png", "image/png", "extract", "m")
            .await
            .unwrap();

        let raw = String::from_utf8(t.bodies.lock().unwrap()[0].clone()).unwrap();
        assert!(raw.contains(r#""temperature":0.3"#), "{raw}");
        let body: Value = serde_json::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(body["temperature"].as_f64(), Some(0.3));
    }

    #[test]
    fn wire_temperature_widens_exact_values() {
        assert_eq!(wire_temperature(0.0), 0.0);
        assert_eq!(wire_temperature(1.0), 1.0);
        assert_eq!(wire_temperature(0.7), 0.7);
    }

    #[tokio::test]
    async fn text_prompt_uses_text_budget() {
        let t = Arc::new(Scripted::default().answer("a", "Paris"));
        let inv = invoker(t.clone(), &["a"])
            .invoke_text("Capital of France?", "m")
            .await
            .unwrap();
        assert_eq!(inv.text, "Paris");

        let body: Value = serde_json::from_slice(&t.bodies.lock().unwrap()[0]).unwrap();
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["content"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn envelope_concatenates_text_blocks() {
        let reply = decode_envelope(
            br#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"text","text":"1}"}]}"#,
        )
        .ok()
        .unwrap();
        assert_eq!(reply.text, r#"{"a":1}"#);
        assert_eq!(reply.input_tokens, 0);
        assert_eq!(reply.stop_reason, None);
    }
}
