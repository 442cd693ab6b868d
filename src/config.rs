//! Configuration types for PDF-to-audiobook conversion.
//!
//! All tunable behaviour is controlled through [`AudiobookConfig`], built via
//! its [`AudiobookConfigBuilder`]. The per-request inputs (document, pages,
//! crop, languages) live in [`crate::request::AudiobookRequest`] instead; the
//! config describes *how* every request on a pipeline is processed.

use crate::error::AudiobookError;
use crate::pipeline::chunk::DEFAULT_MAX_CHUNK_SIZE;
use crate::progress::SharedProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for the audiobook pipeline and its bundled collaborators.
///
/// # Example
/// ```rust
/// use edgequake_pdf2audio::AudiobookConfig;
///
/// let config = AudiobookConfig::builder()
///     .max_chunk_size(300)
///     .voice("af_heart")
///     .dpi(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_chunk_size, 300);
/// ```
#[derive(Clone)]
pub struct AudiobookConfig {
    /// Upper bound on characters per synthesized chunk. Default: 400.
    pub max_chunk_size: usize,

    /// Voice id passed to the synthesizer. If None, the target language's
    /// default voice is used.
    pub voice: Option<String>,

    /// Largest fraction of the page height a single crop margin may remove.
    /// Range: 0.0–1.0. Default: 0.5.
    pub max_crop_fraction: f32,

    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// LLM model identifier used for OCR and translation.
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for LLM completions. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per page or chunk. Default: 4096.
    pub max_tokens: usize,

    /// Transport-level retries inside the LLM collaborators. Default: 2.
    ///
    /// The orchestrator itself never retries a stage.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// HTTP timeout for one synthesis call in seconds. Default: 120.
    pub tts_timeout_secs: u64,

    /// Receives progress events for every request submitted via
    /// [`crate::AudiobookPipeline::submit`].
    pub progress_callback: Option<SharedProgressCallback>,
}

impl Default for AudiobookConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            voice: None,
            max_crop_fraction: 0.5,
            dpi: 150,
            max_rendered_pixels: 2000,
            password: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            download_timeout_secs: 120,
            tts_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AudiobookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudiobookConfig")
            .field("max_chunk_size", &self.max_chunk_size)
            .field("voice", &self.voice)
            .field("max_crop_fraction", &self.max_crop_fraction)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}

impl AudiobookConfig {
    /// Create a new builder for `AudiobookConfig`.
    pub fn builder() -> AudiobookConfigBuilder {
        AudiobookConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AudiobookConfig`].
#[derive(Debug)]
pub struct AudiobookConfigBuilder {
    config: AudiobookConfig,
}

impl AudiobookConfigBuilder {
    pub fn max_chunk_size(mut self, n: usize) -> Self {
        self.config.max_chunk_size = n;
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.config.voice = Some(voice.into());
        self
    }

    pub fn max_crop_fraction(mut self, fraction: f32) -> Self {
        self.config.max_crop_fraction = fraction;
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

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn tts_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tts_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: SharedProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AudiobookConfig, AudiobookError> {
        let c = &self.config;
        if c.max_chunk_size == 0 {
            return Err(AudiobookError::InvalidConfig(
                "max_chunk_size must be ≥ 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.max_crop_fraction) {
            return Err(AudiobookError::InvalidConfig(format!(
                "max_crop_fraction must be 0.0–1.0, got {}",
                c.max_crop_fraction
            )));
        }
        if c.dpi < 72 || c.dpi > 400 {
            return Err(AudiobookError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        Ok(self.config)
    }
}
