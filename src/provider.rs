//! LLM provider resolution and default pipeline wiring.

use crate::collaborators::Collaborators;
use crate::config::AudiobookConfig;
use crate::error::AudiobookError;
use crate::orchestrator::AudiobookPipeline;
use crate::pipeline::llm::{LlmSettings, LlmTranslator, VisionTextRecognizer};
use crate::pipeline::render::PdfiumPageRenderer;
use crate::pipeline::synth::HttpSynthesizer;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Environment variables naming a provider and model together.
pub const PROVIDER_ENV: &str = "PDF2AUDIO_LLM_PROVIDER";
pub const MODEL_ENV: &str = "PDF2AUDIO_MODEL";

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`])
/// 3. `PDF2AUDIO_LLM_PROVIDER` + `PDF2AUDIO_MODEL`, when both are set
/// 4. OpenAI, when `OPENAI_API_KEY` is set
/// 5. whatever [`ProviderFactory::from_env`] detects
pub fn resolve_provider(config: &AudiobookConfig) -> Result<Arc<dyn LLMProvider>, AudiobookError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (std::env::var(PROVIDER_ENV), std::env::var(MODEL_ENV)) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    // With several API keys present, prefer OpenAI unless told otherwise.
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AudiobookError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or {PROVIDER_ENV} + {MODEL_ENV}.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AudiobookError> {
    debug!("Creating LLM provider {} / {}", provider_name, model);
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AudiobookError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

impl AudiobookPipeline {
    /// Wire the bundled collaborators: pdfium rendering, LLM vision OCR and
    /// translation through one resolved provider, and HTTP synthesis against
    /// `tts_endpoint`.
    pub fn from_config(
        config: AudiobookConfig,
        tts_endpoint: impl Into<String>,
    ) -> Result<Self, AudiobookError> {
        let provider = resolve_provider(&config)?;
        let settings = LlmSettings::from_config(&config);

        let collaborators = Collaborators::new(
            Arc::new(PdfiumPageRenderer::from_config(&config)),
            Arc::new(VisionTextRecognizer::new(Arc::clone(&provider), settings)),
            Arc::new(LlmTranslator::new(provider, settings)),
            Arc::new(HttpSynthesizer::new(tts_endpoint, config.tts_timeout_secs)?),
        );
        Ok(Self::new(collaborators, config))
    }
}
