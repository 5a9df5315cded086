//! Translation adapter over HTTP.
//!
//! Translates the assistant's reply from the working language into the
//! user's detected language. All failures map to `Translation`, which the
//! orchestrator recovers from by sending the untranslated text.

use crate::config::ServiceEndpoint;
use crate::error::PipelineError;
use crate::services::TranslateService;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct HttpTranslateService {
    client: Client,
    endpoint: ServiceEndpoint,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    input: &'a str,
    source_language_code: &'a str,
    target_language_code: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

impl HttpTranslateService {
    pub fn new(endpoint: ServiceEndpoint) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl TranslateService for HttpTranslateService {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, PipelineError> {
        if !self.endpoint.is_configured() {
            // Unconfigured translation is recoverable: the caller keeps the
            // original text, matching the stage's non-fatal contract.
            return Err(PipelineError::Translation(
                "translation endpoint not configured".to_string(),
            ));
        }

        let body = TranslateRequest {
            input: text,
            source_language_code: source_language,
            target_language_code: target_language,
        };

        let response = self
            .client
            .post(&self.endpoint.url)
            .bearer_auth(&self.endpoint.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| PipelineError::Translation(format!("request failed: {}", err)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Translation(format!(
                "translation service returned {}",
                response.status()
            )));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Translation(format!("failed to parse response: {}", err)))?;

        Ok(parsed.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let body = TranslateRequest {
            input: "What is the name of the product?",
            source_language_code: "en",
            target_language_code: "kn",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["source_language_code"], "en");
        assert_eq!(json["target_language_code"], "kn");
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_is_recoverable() {
        let service = HttpTranslateService::new(ServiceEndpoint {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 1,
        })
        .unwrap();

        let err = service.translate("hello", "en", "kn").await.unwrap_err();
        assert!(matches!(err, PipelineError::Translation(_)));
        assert!(!err.is_turn_fatal());
    }
}
