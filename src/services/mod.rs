//! # External Service Adapters
//!
//! The four inference services the pipeline calls (speech-to-text, the
//! chat LLM, translation, and speech synthesis) are opaque remote
//! collaborators. Each one is a trait here so the orchestrator can be
//! exercised with in-process fakes, plus an HTTP implementation that
//! ships the request to the configured endpoint.
//!
//! ## Adapter Contract:
//! - One call, one await, bounded by the endpoint's configured timeout
//! - No retries; the orchestrator either falls back or fails the turn once
//! - A missing endpoint URL is `UpstreamUnavailable` at call time

use crate::error::PipelineError;
use async_trait::async_trait;
use std::sync::Arc;

pub mod chat;
pub mod stt;
pub mod translate;
pub mod tts;

pub use chat::HttpChatService;
pub use stt::HttpSttService;
pub use translate::HttpTranslateService;
pub use tts::HttpTtsService;

/// Result of a speech-to-text call.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,

    /// Detected source language (ISO 639-1)
    pub language: String,
}

/// One message of chat-model context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Speech-to-text adapter.
#[async_trait]
pub trait SttService: Send + Sync {
    /// Transcribe canonical mono samples. `language_hint` narrows language
    /// detection when the client declared one.
    async fn transcribe(
        &self,
        samples: &[f32],
        language_hint: Option<&str>,
    ) -> Result<Transcription, PipelineError>;
}

/// Chat-LLM adapter (intent classification and free-form generation).
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Complete the given ordered message history with one reply.
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, PipelineError>;
}

/// Translation adapter.
#[async_trait]
pub trait TranslateService: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, PipelineError>;
}

/// Speech-synthesis adapter.
#[async_trait]
pub trait TtsService: Send + Sync {
    /// Synthesize speech for the given text; returns WAV bytes.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, PipelineError>;
}

/// The full adapter set handed to the orchestrator.
#[derive(Clone)]
pub struct ServiceSet {
    pub stt: Arc<dyn SttService>,
    pub chat: Arc<dyn ChatService>,
    pub translate: Arc<dyn TranslateService>,
    pub tts: Arc<dyn TtsService>,
}

impl ServiceSet {
    /// Build the HTTP adapters from configuration.
    pub fn from_config(config: &crate::config::AppConfig) -> anyhow::Result<Self> {
        let services = &config.services;
        Ok(Self {
            stt: Arc::new(HttpSttService::new(
                services.stt.clone(),
                config.pipeline.sample_rate,
            )?),
            chat: Arc::new(HttpChatService::new(services.chat.clone())?),
            translate: Arc::new(HttpTranslateService::new(services.translate.clone())?),
            tts: Arc::new(HttpTtsService::new(services.tts.clone())?),
        })
    }
}
