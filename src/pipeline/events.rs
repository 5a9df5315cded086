//! # Connection Protocol Frames
//!
//! The wire vocabulary of the conversational gateway.
//!
//! ## Client → Server:
//! - JSON text frame `{"text": "...", "language": "kn"}`: a text turn
//!   (`language` optional)
//! - JSON text frame `{"language": "kn"}`: out-of-band language tag for
//!   the next binary frame
//! - Binary frame: raw audio bytes for an audio turn
//!
//! ## Server → Client:
//! - One status frame per pipeline stage: `{"status": "processing_stt",
//!   "message": "..."}`
//! - Exactly one terminal frame per message: `response_ready` (with text,
//!   optional audio, stage timings, optional navigation link) or `error`

use serde::{Deserialize, Serialize};

/// A decoded client text frame.
///
/// Raw payload shape is decided once, here at the connection boundary;
/// the rest of the pipeline only ever sees the tagged [`Inbound`] union.
#[derive(Debug, Deserialize)]
pub struct TextFrame {
    pub text: Option<String>,
    pub language: Option<String>,
}

/// The tagged union of things a client text frame can mean.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    /// A text utterance, optionally with a declared language
    Utterance {
        text: String,
        language: Option<String>,
    },

    /// Language tag applying to the next binary (audio) frame
    LanguageHint(String),
}

impl TextFrame {
    /// Classify the frame. Frames with neither field are malformed.
    pub fn into_inbound(self) -> Result<Inbound, String> {
        match (self.text, self.language) {
            (Some(text), language) => Ok(Inbound::Utterance { text, language }),
            (None, Some(language)) => Ok(Inbound::LanguageHint(language)),
            (None, None) => Err("frame carries neither text nor language".to_string()),
        }
    }
}

/// Per-stage durations reported in the terminal frame, in milliseconds.
///
/// Each value is the gap between that stage's completion and the previous
/// stage's completion; stages that did not run report zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePerformance {
    pub stt_duration: u64,
    pub llm_duration: u64,
    pub translation_duration: u64,
    pub tts_duration: u64,
    pub total_duration: u64,
}

/// Frames pushed to the client over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once after the connection is registered
    Connected { message: String },

    /// Audio normalization is starting (audio turns only)
    ProcessingAudio { message: String },

    /// Speech-to-text is starting (audio turns only)
    ProcessingStt { message: String },

    /// The dialog step (and classification, when needed) is starting
    ProcessingLlm { message: String },

    /// Reply translation is starting (only when languages differ)
    ProcessingTranslation { message: String },

    /// Speech synthesis is starting
    ProcessingTts { message: String },

    /// Terminal frame: the turn completed
    ResponseReady {
        text: String,

        /// Base64-encoded WAV; absent when synthesis failed or was skipped
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_base64: Option<String>,

        performance: StagePerformance,

        /// Deep link into the app form, when the dialog produced one
        #[serde(skip_serializing_if = "Option::is_none")]
        navigation_url: Option<String>,

        /// Set when synthesis failed and the payload is text-only
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        tts_error: bool,
    },

    /// Terminal frame: the turn failed
    Error { message: String },
}

impl ServerEvent {
    /// Whether this frame ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::ResponseReady { .. } | ServerEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_frame_serialization() {
        let event = ServerEvent::ProcessingStt {
            message: "Transcribing audio...".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "processing_stt");
        assert_eq!(json["message"], "Transcribing audio...");
    }

    #[test]
    fn test_terminal_frame_serialization() {
        let event = ServerEvent::ResponseReady {
            text: "What is the name of the product?".to_string(),
            audio_base64: Some("UklGRg==".to_string()),
            performance: StagePerformance {
                stt_duration: 120,
                llm_duration: 340,
                translation_duration: 0,
                tts_duration: 200,
                total_duration: 660,
            },
            navigation_url: Some("/farmer/add/product?".to_string()),
            tts_error: false,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "response_ready");
        assert_eq!(json["performance"]["sttDuration"], 120);
        assert_eq!(json["performance"]["totalDuration"], 660);
        assert_eq!(json["navigation_url"], "/farmer/add/product?");
        // Soft flag is omitted when false
        assert!(json.get("tts_error").is_none());
    }

    #[test]
    fn test_degraded_frame_keeps_tts_error_flag() {
        let event = ServerEvent::ResponseReady {
            text: "reply".to_string(),
            audio_base64: None,
            performance: StagePerformance::default(),
            navigation_url: None,
            tts_error: true,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["tts_error"], true);
        assert!(json.get("audio_base64").is_none());
    }

    #[test]
    fn test_inbound_decoding() {
        let frame: TextFrame =
            serde_json::from_str(r#"{"text": "hello", "language": "kn"}"#).unwrap();
        assert_eq!(
            frame.into_inbound().unwrap(),
            Inbound::Utterance {
                text: "hello".to_string(),
                language: Some("kn".to_string()),
            }
        );

        let frame: TextFrame = serde_json::from_str(r#"{"language": "kn"}"#).unwrap();
        assert_eq!(
            frame.into_inbound().unwrap(),
            Inbound::LanguageHint("kn".to_string())
        );

        let frame: TextFrame = serde_json::from_str(r#"{}"#).unwrap();
        assert!(frame.into_inbound().is_err());
    }

    #[test]
    fn test_terminal_detection() {
        assert!(ServerEvent::Error { message: "x".into() }.is_terminal());
        assert!(!ServerEvent::ProcessingLlm { message: "x".into() }.is_terminal());
    }
}
