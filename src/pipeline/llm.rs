//! LLM-backed collaborators: vision OCR and chunk translation.
//!
//! Both go through the same [`LLMProvider`] and the same retry loop; only
//! the messages differ. Prompt wording lives in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent. Each call
//! is retried with exponential backoff (`retry_backoff_ms * 2^attempt`):
//! with 500 ms base and 2 retries the waits are 500 ms → 1 s. These are
//! transport retries for one page or chunk; the orchestrator never retries a
//! stage.

use crate::collaborators::{PageContent, ProcessedPage, TextRecognizer, Translator};
use crate::config::AudiobookConfig;
use crate::error::ServiceError;
use crate::pipeline::encode::encode_page;
use crate::prompts::{ocr_prompt, translation_prompt};
use crate::request::Language;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Sampling and retry settings shared by the LLM collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LlmSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self::from_config(&AudiobookConfig::default())
    }
}

impl LlmSettings {
    pub fn from_config(config: &AudiobookConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Run `op` up to `max_retries + 1` times with exponential backoff.
///
/// Returns the first success, or the last error wrapped as
/// [`ServiceError::Request`].
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &str,
    max_retries: u32,
    backoff_ms: u64,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_err: Option<String> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let msg = e.to_string();
                warn!("{}: attempt {} failed: {}", label, attempt + 1, msg);
                last_err = Some(msg);
            }
        }
    }

    Err(ServiceError::Request(format!(
        "{} failed after {} attempt(s): {}",
        label,
        max_retries + 1,
        last_err.unwrap_or_else(|| "Unknown error".to_string())
    )))
}

async fn chat(
    provider: &Arc<dyn LLMProvider>,
    messages: &[ChatMessage],
    settings: &LlmSettings,
    label: &str,
) -> Result<String, ServiceError> {
    let options = settings.options();
    let options = &options;
    let provider = provider.as_ref();
    let start = Instant::now();

    let response = retry_with_backoff(label, settings.max_retries, settings.retry_backoff_ms, move || {
        provider.chat(messages, Some(options))
    })
    .await?;

    debug!(
        "{}: {} input tokens, {} output tokens, {:?}",
        label,
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );
    Ok(response.content)
}

/// Reads cropped page images with a vision-capable model.
///
/// Pages that already carry text ([`PageContent::Text`]) are passed through
/// without a model call.
#[derive(Clone)]
pub struct VisionTextRecognizer {
    provider: Arc<dyn LLMProvider>,
    settings: LlmSettings,
}

impl VisionTextRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: LlmSettings) -> Self {
        Self { provider, settings }
    }
}

#[async_trait]
impl TextRecognizer for VisionTextRecognizer {
    async fn recognize(
        &self,
        page: &ProcessedPage,
        language_hint: Language,
    ) -> Result<String, ServiceError> {
        let image = match &page.content {
            PageContent::Text(text) => return Ok(text.clone()),
            PageContent::Image(image) => image,
        };

        let image_data = encode_page(image).map_err(|e| {
            ServiceError::Decode(format!("page {}: image encoding failed: {}", page.page_num, e))
        })?;

        // The image carries all the content; the user text stays empty.
        let messages = vec![
            ChatMessage::system(ocr_prompt(language_hint)),
            ChatMessage::user_with_images("", vec![image_data]),
        ];

        let label = format!("Page {}", page.page_num);
        let text = chat(&self.provider, &messages, &self.settings, &label).await?;
        Ok(text.trim().to_string())
    }
}

/// Translates chunks with a text model.
#[derive(Clone)]
pub struct LlmTranslator {
    provider: Arc<dyn LLMProvider>,
    settings: LlmSettings,
}

impl LlmTranslator {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: LlmSettings) -> Self {
        Self { provider, settings }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(
        &self,
        source: Language,
        target: Language,
        text: &str,
    ) -> Result<String, ServiceError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let messages = vec![
            ChatMessage::system(translation_prompt(source, target)),
            ChatMessage::user(text),
        ];

        let label = format!("Translate {}→{}", source.code(), target.code());
        let translated = chat(&self.provider, &messages, &self.settings, &label).await?;
        let translated = translated.trim();
        if translated.is_empty() {
            return Err(ServiceError::EmptyOutput(format!(
                "model returned no translation for {} chars of {}",
                text.chars().count(),
                source
            )));
        }
        Ok(translated.to_string())
    }
}
