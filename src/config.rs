//! # Configuration Management
//!
//! Loads and manages application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVICES_STT_URL, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The `pipeline` section fixes the canonical audio format and working
//! language of the assistant; the `services` section points at the four
//! external inference endpoints (STT, chat LLM, translation, TTS).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub services: ServicesConfig,
    pub history: HistoryConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Message-pipeline configuration.
///
/// ## Fields:
/// - `working_language`: ISO 639-1 code of the language the dialog engine
///   authors replies in; replies are translated when the user's detected
///   language differs
/// - `sample_rate`: canonical sample rate (Hz) inbound audio is
///   normalized to before STT
/// - `fallback_intent`: intent used when classification fails or returns
///   an unknown label ("product_listing" or "collaboration")
/// - `max_audio_bytes`: upper bound on a single inbound audio frame
/// - `llm_history_window`: number of most-recent turns (plus the system
///   turn) sent to the chat model as context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub working_language: String,
    pub sample_rate: u32,
    pub fallback_intent: String,
    pub max_audio_bytes: usize,
    pub llm_history_window: usize,
}

/// Connection details for the four external inference services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub stt: ServiceEndpoint,
    pub chat: ServiceEndpoint,
    pub translate: ServiceEndpoint,
    pub tts: ServiceEndpoint,
}

/// One remote service endpoint.
///
/// An empty `url` means the service is not configured; turns that need it
/// fail with a service-unavailable message rather than retrying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl ServiceEndpoint {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Background history persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Depth of the bounded write queue; turns are dropped (with a warning)
    /// when the queue is full
    pub queue_depth: usize,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            pipeline: PipelineConfig {
                working_language: "en".to_string(),
                sample_rate: 16000,
                fallback_intent: "product_listing".to_string(),
                max_audio_bytes: 10 * 1024 * 1024,
                llm_history_window: 10,
            },
            services: ServicesConfig {
                stt: ServiceEndpoint {
                    url: String::new(),
                    api_key: String::new(),
                    timeout_secs: 30,
                },
                chat: ServiceEndpoint {
                    url: String::new(),
                    api_key: String::new(),
                    timeout_secs: 60,
                },
                translate: ServiceEndpoint {
                    url: String::new(),
                    api_key: String::new(),
                    timeout_secs: 15,
                },
                tts: ServiceEndpoint {
                    url: String::new(),
                    api_key: String::new(),
                    timeout_secs: 30,
                },
            },
            history: HistoryConfig { queue_depth: 256 },
            performance: PerformanceConfig {
                max_concurrent_sessions: 50,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///    (used by deployment platforms)
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration errors early prevents runtime failures and
    /// provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.pipeline.sample_rate == 0 {
            return Err(anyhow::anyhow!("Pipeline sample rate cannot be 0"));
        }

        if self.pipeline.working_language.trim().is_empty() {
            return Err(anyhow::anyhow!("Working language cannot be empty"));
        }

        if !matches!(
            self.pipeline.fallback_intent.as_str(),
            "product_listing" | "collaboration"
        ) {
            return Err(anyhow::anyhow!(
                "Unknown fallback intent: {}",
                self.pipeline.fallback_intent
            ));
        }

        if self.pipeline.max_audio_bytes == 0 {
            return Err(anyhow::anyhow!("Max audio bytes must be greater than 0"));
        }

        if self.history.queue_depth == 0 {
            return Err(anyhow::anyhow!("History queue depth must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only the fields present in the JSON are changed. For example, sending
    /// `{"pipeline": {"working_language": "hi"}}` switches the assistant
    /// language without touching anything else. Service endpoints are not
    /// updatable at runtime (adapters are constructed once at startup).
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(pipeline) = partial_config.get("pipeline") {
            if let Some(lang) = pipeline.get("working_language").and_then(|v| v.as_str()) {
                self.pipeline.working_language = lang.to_string();
            }
            if let Some(intent) = pipeline.get("fallback_intent").and_then(|v| v.as_str()) {
                self.pipeline.fallback_intent = intent.to_string();
            }
            if let Some(max) = pipeline.get("max_audio_bytes").and_then(|v| v.as_u64()) {
                self.pipeline.max_audio_bytes = max as usize;
            }
            if let Some(window) = pipeline.get("llm_history_window").and_then(|v| v.as_u64()) {
                self.pipeline.llm_history_window = window as usize;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.working_language, "en");
        assert_eq!(config.pipeline.sample_rate, 16000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.fallback_intent = "weather".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"pipeline": {"working_language": "hi"}, "server": {"port": 9090}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.pipeline.working_language, "hi");
        // Other fields should remain unchanged
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.pipeline.sample_rate, 16000);
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"pipeline": {"fallback_intent": "weather"}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
