//! Chat-LLM adapter over HTTP (chat-completions style).
//!
//! Used for intent classification; the request carries the ordered message
//! history and the response is the model's free-form reply. Errors map to
//! `Classification` (recovered by the dialog fallback) except for a
//! missing endpoint, which is fatal to the turn.

use crate::config::ServiceEndpoint;
use crate::error::PipelineError;
use crate::services::{ChatService, ChatTurn};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct HttpChatService {
    client: Client,
    endpoint: ServiceEndpoint,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl HttpChatService {
    pub fn new(endpoint: ServiceEndpoint) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, PipelineError> {
        if !self.endpoint.is_configured() {
            return Err(PipelineError::UpstreamUnavailable("AI processing".to_string()));
        }

        let body = ChatCompletionRequest { messages: turns };

        let response = self
            .client
            .post(&self.endpoint.url)
            .bearer_auth(&self.endpoint.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| PipelineError::Classification(format!("chat request failed: {}", err)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Classification(format!(
                "chat service returned {}",
                response.status()
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|err| {
            PipelineError::Classification(format!("failed to parse chat response: {}", err))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(PipelineError::Classification(
                "chat service returned no content".to_string(),
            ));
        }

        debug!(chars = content.len(), "Chat completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let turns = vec![
            ChatTurn::new("system", "You are FarmSocial AI."),
            ChatTurn::new("user", "I want to add a new product"),
        ];
        let json = serde_json::to_value(ChatCompletionRequest { messages: &turns }).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "I want to add a new product");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": " product "}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, " product ");
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_is_unavailable() {
        let service = HttpChatService::new(ServiceEndpoint {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 1,
        })
        .unwrap();

        let err = service.complete(&[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnavailable(_)));
    }
}
