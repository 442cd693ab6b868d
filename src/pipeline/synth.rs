//! Speech synthesis over HTTP.
//!
//! [`HttpSynthesizer`] POSTs `{"text": …, "voice": …}` as JSON to a TTS
//! endpoint and expects a WAV body back, which it decodes with
//! [`crate::pipeline::wav::decode_wav`]. Any server that speaks this shape
//! works (a local Kokoro or Piper wrapper, a cloud proxy, …).

use crate::collaborators::Synthesizer;
use crate::error::{AudiobookError, ServiceError};
use crate::pipeline::wav::{decode_wav, AudioSegment};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Longest error body quoted back in a [`ServiceError`].
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

/// [`Synthesizer`] that calls a JSON-in, WAV-out HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthesizer {
    /// `timeout_secs` bounds each individual synthesis call.
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, AudiobookError> {
        let endpoint = endpoint.into();
        reqwest::Url::parse(&endpoint).map_err(|e| {
            AudiobookError::InvalidConfig(format!("TTS endpoint '{}' is not a URL: {}", endpoint, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AudiobookError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioSegment, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SynthesisRequest {
                text,
                voice: voice_id,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ServiceError::Unavailable(format!("{}: {}", self.endpoint, e))
                } else {
                    ServiceError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(ServiceError::Request(format!("HTTP {}: {}", status, body.trim())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Request(format!("reading audio body: {}", e)))?;
        let segment = decode_wav(&bytes)?;
        debug!(
            "Synthesized {} chars → {} samples @ {} Hz",
            text.chars().count(),
            segment.samples.len(),
            segment.sample_rate
        );
        Ok(segment)
    }
}
