//! Configuration types for PDF-to-JSON extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is read-only once built and
//! is passed explicitly into every entry point, so two documents processed
//! concurrently share nothing mutable. Test doubles for the model transport
//! and the rasteriser are injected through the same struct.

use crate::error::ExtractError;
use crate::pipeline::invoke::ModelTransport;
use crate::pipeline::render::Rasterizer;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Model used when neither the request nor the config names one.
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

/// Protocol version tag for Anthropic models served by Bedrock.
pub const DEFAULT_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Region fallback order used when the caller configures none.
pub const DEFAULT_REGIONS: &[&str] = &["us-east-1", "eu-central-1"];

/// Configuration for a PDF-to-JSON extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_bedrock_json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model_id("anthropic.claude-3-5-sonnet-20240620-v1:0")
///     .regions(["eu-west-1", "eu-central-1"])
///     .dpi(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.regions, vec!["eu-west-1", "eu-central-1"]);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Bedrock model identifier used when a request does not name one.
    pub model_id: String,

    /// Regions to try, in fixed priority order. Never empty, never duplicated.
    pub regions: Vec<String>,

    /// Replacement for the built-in default extraction instruction.
    pub default_instruction: Option<String>,

    /// `anthropic_version` tag sent with every request.
    pub anthropic_version: String,

    /// Output-token budget per page. Default: 16000.
    ///
    /// Pages with dense tables produce long JSON documents; a budget that is
    /// too small truncates the answer mid-object and the page comes back as
    /// unparsed.
    pub max_tokens: u32,

    /// Output-token budget for text-only prompts. Default: 1024.
    pub text_max_tokens: u32,

    /// Optional sampling temperature (0.0–1.0). `None` uses the model default.
    pub temperature: Option<f32>,

    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps memory and upload size independently of DPI: a 150-DPI render of
    /// an A0 poster would otherwise be over 7000 px wide.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Largest accepted document in bytes. Default: 25 MiB.
    ///
    /// Enforced when resolving inputs, before the document reaches the
    /// rasteriser.
    pub max_document_bytes: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Timeout for a single region attempt in seconds. Default: 120.
    ///
    /// A timed-out attempt counts as that region's failure and the invoker
    /// moves on to the next region.
    pub api_timeout_secs: u64,

    /// Parent directory for per-request scratch directories. Default: OS temp dir.
    pub scratch_dir: Option<PathBuf>,

    /// Pre-constructed model transport. Default: Bedrock clients for `regions`.
    pub transport: Option<Arc<dyn ModelTransport>>,

    /// Pre-constructed rasteriser. Default: pdfium.
    pub rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,

    /// Bedrock transport built on first use when `transport` is unset.
    /// Clones of the config share it, so clients and credentials are
    /// resolved once.
    pub(crate) default_transport: Arc<OnceCell<Arc<dyn ModelTransport>>>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            default_instruction: None,
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            max_tokens: 16_000,
            text_max_tokens: 1024,
            temperature: None,
            dpi: 150,
            max_rendered_pixels: 2000,
            password: None,
            max_document_bytes: 25 * 1024 * 1024,
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            scratch_dir: None,
            transport: None,
            rasterizer: None,
            progress_callback: None,
            default_transport: Arc::new(OnceCell::new()),
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model_id", &self.model_id)
            .field("regions", &self.regions)
            .field(
                "default_instruction",
                &self.default_instruction.as_ref().map(|s| s.len()),
            )
            .field("anthropic_version", &self.anthropic_version)
            .field("max_tokens", &self.max_tokens)
            .field("text_max_tokens", &self.text_max_tokens)
            .field("temperature", &self.temperature)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("scratch_dir", &self.scratch_dir)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn ModelTransport>"))
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn Rasterizer>"))
            .field("default_transport_ready", &self.default_transport.initialized())
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model to use for a request: the override if non-blank, else the default.
    pub fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested.map(str::trim) {
            Some(m) if !m.is_empty() => m,
            _ => self.model_id.as_str(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model_id(mut self, model: impl Into<String>) -> Self {
        self.config.model_id = model.into();
        self
    }

    /// Replace the region list. Order is preserved; duplicates are dropped.
    pub fn regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_instruction(mut self, text: impl Into<String>) -> Self {
        self.config.default_instruction = Some(text.into());
        self
    }

    pub fn anthropic_version(mut self, version: impl Into<String>) -> Self {
        self.config.anthropic_version = version.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn text_max_tokens(mut self, n: u32) -> Self {
        self.config.text_max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 1.0));
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn max_document_bytes(mut self, n: u64) -> Self {
        self.config.max_document_bytes = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ModelTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ExtractionConfig, ExtractError> {
        let mut seen: Vec<String> = Vec::with_capacity(self.config.regions.len());
        for region in &self.config.regions {
            let region = region.trim();
            if region.is_empty() {
                return Err(ExtractError::InvalidConfig(
                    "Region names must not be empty".into(),
                ));
            }
            if !seen.iter().any(|r| r == region) {
                seen.push(region.to_string());
            }
        }
        if seen.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "At least one region is required".into(),
            ));
        }
        self.config.regions = seen;

        let c = &self.config;
        if c.model_id.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Model id must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 || c.text_max_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "Token budgets must be ≥ 1".into(),
            ));
        }
        if c.anthropic_version.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "anthropic_version must not be empty".into(),
            ));
        }
        if c.max_document_bytes == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_document_bytes must be ≥ 1".into(),
            ));
        }
        if matches!(&c.default_instruction, Some(text) if text.trim().is_empty()) {
            return Err(ExtractError::InvalidConfig(
                "default_instruction must not be blank".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExtractionConfig::builder().build().expect("valid");
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.regions, vec!["us-east-1", "eu-central-1"]);
        assert_eq!(config.anthropic_version, "bedrock-2023-05-31");
        assert_eq!(config.max_tokens, 16_000);
    }

    #[test]
    fn regions_keep_order_and_drop_duplicates() {
        let config = ExtractionConfig::builder()
            .regions(["eu-central-1", " us-west-2 ", "eu-central-1"])
            .build()
            .unwrap();
        assert_eq!(config.regions, vec!["eu-central-1", "us-west-2"]);
    }

    #[test]
    fn empty_region_list_rejected() {
        let err = ExtractionConfig::builder()
            .regions(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));

        let err = ExtractionConfig::builder().regions(["  "]).build().unwrap_err();
        assert!(err.to_string().contains("Region"));
    }

    #[test]
    fn clamps_dpi_and_temperature() {
        let config = ExtractionConfig::builder()
            .dpi(9000)
            .temperature(3.0)
            .build()
            .unwrap();
        assert_eq!(config.dpi, 400);
        assert_eq!(config.temperature, Some(1.0));
    }

    #[test]
    fn zero_token_budget_rejected() {
        assert!(ExtractionConfig::builder().max_tokens(0).build().is_err());
        assert!(ExtractionConfig::builder().text_max_tokens(0).build().is_err());
    }

    #[test]
    fn resolve_model_prefers_non_blank_override() {
        let config = ExtractionConfig::default();
        assert_eq!(config.resolve_model(Some("custom.model")), "custom.model");
        assert_eq!(config.resolve_model(Some("   ")), DEFAULT_MODEL_ID);
        assert_eq!(config.resolve_model(None), DEFAULT_MODEL_ID);
    }
}
