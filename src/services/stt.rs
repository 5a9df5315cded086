//! Speech-to-text over HTTP.
//!
//! Ships canonical PCM audio (base64-encoded) to the configured STT
//! endpoint and returns the transcript together with the detected source
//! language.

use crate::audio::samples_to_pcm_bytes;
use crate::config::ServiceEndpoint;
use crate::error::PipelineError;
use crate::services::{SttService, Transcription};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct HttpSttService {
    client: Client,
    endpoint: ServiceEndpoint,

    /// Canonical sample rate of the samples handed to [`transcribe`]
    sample_rate: u32,
}

#[derive(Serialize)]
struct SttRequest {
    audio_base64: String,
    sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_hint: Option<String>,
}

#[derive(Deserialize)]
struct SttResponse {
    transcript: String,
    language_code: String,
}

impl HttpSttService {
    pub fn new(endpoint: ServiceEndpoint, sample_rate: u32) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            sample_rate,
        })
    }
}

#[async_trait]
impl SttService for HttpSttService {
    async fn transcribe(
        &self,
        samples: &[f32],
        language_hint: Option<&str>,
    ) -> Result<Transcription, PipelineError> {
        if !self.endpoint.is_configured() {
            return Err(PipelineError::UpstreamUnavailable(
                "Speech recognition".to_string(),
            ));
        }

        let body = SttRequest {
            audio_base64: BASE64_STANDARD.encode(samples_to_pcm_bytes(samples)),
            sample_rate: self.sample_rate,
            language_hint: language_hint.map(str::to_string),
        };

        let response = self
            .client
            .post(&self.endpoint.url)
            .bearer_auth(&self.endpoint.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| PipelineError::Stt(format!("STT request failed: {}", err)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Stt(format!(
                "STT service returned {}",
                response.status()
            )));
        }

        let parsed: SttResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Stt(format!("Failed to parse STT response: {}", err)))?;

        debug!(
            chars = parsed.transcript.len(),
            language = %parsed.language_code,
            "STT transcription received"
        );

        Ok(Transcription {
            text: parsed.transcript,
            language: parsed.language_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let body = SttRequest {
            audio_base64: "AAAA".to_string(),
            sample_rate: 16000,
            language_hint: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sample_rate"], 16000);
        assert!(json.get("language_hint").is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_is_unavailable() {
        let service = HttpSttService::new(
            ServiceEndpoint {
                url: String::new(),
                api_key: String::new(),
                timeout_secs: 1,
            },
            16000,
        )
        .unwrap();

        let err = service.transcribe(&[0.0; 160], None).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnavailable(_)));
    }
}
