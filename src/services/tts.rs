//! Speech-synthesis adapter over HTTP.
//!
//! Synthesizes the final reply into WAV bytes. All failures (including an
//! unconfigured endpoint) map to `Synthesis`: audio is best-effort and the
//! turn still completes as text-only.

use crate::config::ServiceEndpoint;
use crate::error::PipelineError;
use crate::services::TtsService;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct HttpTtsService {
    client: Client,
    endpoint: ServiceEndpoint,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    target_language_code: &'a str,
}

#[derive(Deserialize)]
struct TtsResponse {
    audio_base64: String,
}

impl HttpTtsService {
    pub fn new(endpoint: ServiceEndpoint) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl TtsService for HttpTtsService {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, PipelineError> {
        if !self.endpoint.is_configured() {
            return Err(PipelineError::Synthesis(
                "synthesis endpoint not configured".to_string(),
            ));
        }

        let body = TtsRequest {
            text,
            target_language_code: language,
        };

        let response = self
            .client
            .post(&self.endpoint.url)
            .bearer_auth(&self.endpoint.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| PipelineError::Synthesis(format!("request failed: {}", err)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Synthesis(format!(
                "synthesis service returned {}",
                response.status()
            )));
        }

        let parsed: TtsResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Synthesis(format!("failed to parse response: {}", err)))?;

        let audio = BASE64_STANDARD
            .decode(parsed.audio_base64.as_bytes())
            .map_err(|err| PipelineError::Synthesis(format!("invalid audio encoding: {}", err)))?;

        debug!(bytes = audio.len(), language, "Synthesized speech received");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let body = TtsRequest {
            text: "Which unit is that in?",
            target_language_code: "kn",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["text"], "Which unit is that in?");
        assert_eq!(json["target_language_code"], "kn");
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_is_recoverable() {
        let service = HttpTtsService::new(ServiceEndpoint {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 1,
        })
        .unwrap();

        let err = service.synthesize("hello", "kn").await.unwrap_err();
        assert!(matches!(err, PipelineError::Synthesis(_)));
        assert!(!err.is_turn_fatal());
    }
}
