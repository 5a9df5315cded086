//! # Pipeline Orchestrator
//!
//! Drives one inbound message through the fixed stage sequence:
//!
//! ```text
//! ingest → (normalize → STT, audio only) → dialog step
//!        → (translate, when languages differ) → TTS → terminal frame
//! ```
//!
//! A status frame goes out before each stage begins and exactly one
//! terminal frame (`response_ready` or `error`) ends the turn. Completed
//! stages stamp a timestamp; the terminal payload reports the per-stage
//! durations.
//!
//! ## Failure Policy (see `error.rs`):
//! Stage-fatal failures short-circuit the remaining stages. Recoverable
//! ones degrade: classification falls back to the default intent,
//! translation falls back to the untranslated reply, synthesis falls back
//! to a text-only payload with a soft error flag.
//!
//! History persistence is dispatched through the bounded background
//! writer and never blocks or fails the turn.

use crate::audio::decoder;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::history::store::{HistoryStore, Role, Turn};
use crate::history::writer::HistoryWriter;
use crate::pipeline::events::{ServerEvent, StagePerformance};
use crate::services::{ChatTurn, ServiceSet};
use crate::session::dialog::Intent;
use crate::session::registry::Session;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Prompt used when the dialog engine needs an intent label.
const CLASSIFIER_PROMPT: &str = "You label requests from farmers using a marketplace app. \
Reply with exactly one word: 'product' if the farmer wants to list a product for sale, or \
'collaboration' if the farmer wants help from an influencer to promote their produce.";

/// Placeholder stored as the user-turn content for audio messages; the
/// transcript is kept alongside in the turn's transcription field.
const AUDIO_CONTENT_PLACEHOLDER: &str = "<audio_input>";

/// One inbound message, decoded at the connection boundary.
#[derive(Debug)]
pub enum TurnInput {
    Text {
        text: String,
        language: Option<String>,
    },
    Audio {
        bytes: Vec<u8>,
        language: Option<String>,
    },
}

/// Pipeline behavior settings, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub working_language: String,
    pub sample_rate: u32,
    pub fallback_intent: Intent,
    pub max_audio_bytes: usize,
    pub llm_history_window: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let fallback_intent = config
            .fallback_intent
            .parse::<Intent>()
            .map_err(|err| anyhow::anyhow!(err))?;
        Ok(Self {
            working_language: config.working_language.clone(),
            sample_rate: config.sample_rate,
            fallback_intent,
            max_audio_bytes: config.max_audio_bytes,
            llm_history_window: config.llm_history_window,
        })
    }
}

/// Stage timestamps for one in-flight message.
///
/// Ephemeral: one per message, destroyed when the run completes or fails,
/// never shared across runs.
struct PipelineRun {
    started: Instant,
    received_at: i64,
    stt_done: Option<Instant>,
    stt_done_at: Option<i64>,
    llm_done: Option<Instant>,
    llm_done_at: Option<i64>,
    translation_done: Option<Instant>,
    tts_done: Option<Instant>,
    tts_done_at: Option<i64>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            received_at: Utc::now().timestamp_millis(),
            stt_done: None,
            stt_done_at: None,
            llm_done: None,
            llm_done_at: None,
            translation_done: None,
            tts_done: None,
            tts_done_at: None,
        }
    }

    fn mark_stt(&mut self) {
        self.stt_done = Some(Instant::now());
        self.stt_done_at = Some(Utc::now().timestamp_millis());
    }

    fn mark_llm(&mut self) {
        self.llm_done = Some(Instant::now());
        self.llm_done_at = Some(Utc::now().timestamp_millis());
    }

    fn mark_translation(&mut self) {
        self.translation_done = Some(Instant::now());
    }

    fn mark_tts(&mut self) {
        self.tts_done = Some(Instant::now());
        self.tts_done_at = Some(Utc::now().timestamp_millis());
    }

    /// Stage durations: each is the gap between that stage's completion
    /// and the previous completed stage; stages that did not run report 0.
    fn performance(&self) -> StagePerformance {
        let millis = |later: Instant, earlier: Instant| -> u64 {
            later.duration_since(earlier).as_millis() as u64
        };

        let stt_duration = self.stt_done.map(|t| millis(t, self.started)).unwrap_or(0);
        let llm_base = self.stt_done.unwrap_or(self.started);
        let llm_duration = self.llm_done.map(|t| millis(t, llm_base)).unwrap_or(0);
        let translation_base = self.llm_done.unwrap_or(llm_base);
        let translation_duration = self
            .translation_done
            .map(|t| millis(t, translation_base))
            .unwrap_or(0);
        let tts_base = self
            .translation_done
            .or(self.llm_done)
            .unwrap_or(translation_base);
        let tts_duration = self.tts_done.map(|t| millis(t, tts_base)).unwrap_or(0);

        StagePerformance {
            stt_duration,
            llm_duration,
            translation_duration,
            tts_duration,
            total_duration: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Everything a successful turn hands back for the terminal frame.
struct TurnReply {
    text: String,
    audio_base64: Option<String>,
    navigation_url: String,
    tts_error: bool,
}

/// Per-message pipeline driver. One instance serves all sessions;
/// per-message state lives in the `PipelineRun` on the stack.
pub struct PipelineOrchestrator {
    services: ServiceSet,
    store: Arc<dyn HistoryStore>,
    history: Arc<HistoryWriter>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        services: ServiceSet,
        store: Arc<dyn HistoryStore>,
        history: Arc<HistoryWriter>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            services,
            store,
            history,
            settings,
        }
    }

    /// Process one message end to end.
    ///
    /// Always emits exactly one terminal frame on the session. Returns
    /// whether the turn completed successfully (for metrics).
    pub async fn run_turn(&self, session: Arc<Session>, input: TurnInput) -> bool {
        let mut run = PipelineRun::new();

        match self.execute(&session, input, &mut run).await {
            Ok(reply) => {
                let performance = run.performance();
                info!(
                    client_id = %session.client_id,
                    total_ms = performance.total_duration,
                    tts_error = reply.tts_error,
                    "Turn completed"
                );
                session.send(ServerEvent::ResponseReady {
                    text: reply.text,
                    audio_base64: reply.audio_base64,
                    performance,
                    navigation_url: Some(reply.navigation_url),
                    tts_error: reply.tts_error,
                });
                true
            }
            Err(err) => {
                warn!(client_id = %session.client_id, error = %err, "Turn failed");
                session.send(ServerEvent::Error {
                    message: err.user_message(),
                });
                false
            }
        }
    }

    async fn execute(
        &self,
        session: &Session,
        input: TurnInput,
        run: &mut PipelineRun,
    ) -> Result<TurnReply, PipelineError> {
        // Stage 1+2: ingest, and for audio input normalize + transcribe.
        let (utterance, source_language, user_content, transcription) = match input {
            TurnInput::Text { text, language } => {
                let language = language.unwrap_or_else(|| self.settings.working_language.clone());
                (text.clone(), language, text, None)
            }
            TurnInput::Audio { bytes, language } => {
                if bytes.len() > self.settings.max_audio_bytes {
                    return Err(PipelineError::AudioDecode(format!(
                        "audio frame of {} bytes exceeds the {} byte limit",
                        bytes.len(),
                        self.settings.max_audio_bytes
                    )));
                }

                session.send(ServerEvent::ProcessingAudio {
                    message: "Processing audio...".to_string(),
                });
                let samples = decoder::normalize(&bytes, self.settings.sample_rate)?;

                session.send(ServerEvent::ProcessingStt {
                    message: "Transcribing audio...".to_string(),
                });
                let transcription = self
                    .services
                    .stt
                    .transcribe(&samples, language.as_deref())
                    .await?;
                run.mark_stt();

                if transcription.text.trim().is_empty() {
                    return Err(PipelineError::Stt("empty transcript".to_string()));
                }

                debug!(
                    client_id = %session.client_id,
                    language = %transcription.language,
                    "Audio transcribed"
                );
                (
                    transcription.text.clone(),
                    transcription.language,
                    AUDIO_CONTENT_PLACEHOLDER.to_string(),
                    Some(transcription.text),
                )
            }
        };

        // Stage 3: the dialog step. Classification runs first when this is
        // the opening utterance of a cycle; its failure never aborts the
        // turn unless the chat service is missing outright.
        session.send(ServerEvent::ProcessingLlm {
            message: "Thinking...".to_string(),
        });

        let history_session = self.store.get_or_create_active_session(&session.client_id);

        let classification = if session.with_dialog(|dialog| dialog.needs_classification()) {
            match self.classify(&history_session, &utterance).await {
                Ok(label) => Some(label),
                Err(err @ PipelineError::UpstreamUnavailable(_)) => return Err(err),
                Err(err) => {
                    warn!(
                        client_id = %session.client_id,
                        error = %err,
                        "Classification failed, using fallback intent"
                    );
                    None
                }
            }
        } else {
            None
        };

        let outcome = session.with_dialog(|dialog| {
            dialog.step(
                &utterance,
                classification.as_deref(),
                self.settings.fallback_intent,
            )
        });
        run.mark_llm();
        debug!(
            client_id = %session.client_id,
            decision = ?outcome.decision,
            "Dialog step completed"
        );

        // Stage 4: translate the reply into the user's language when it
        // differs from the working language. Failure keeps the original.
        let mut reply_text = outcome.reply;
        if source_language != self.settings.working_language {
            session.send(ServerEvent::ProcessingTranslation {
                message: "Translating response...".to_string(),
            });
            match self
                .services
                .translate
                .translate(&reply_text, &self.settings.working_language, &source_language)
                .await
            {
                Ok(translated) => reply_text = translated,
                Err(err) => {
                    warn!(
                        client_id = %session.client_id,
                        error = %err,
                        "Translation failed, sending untranslated reply"
                    );
                }
            }
            run.mark_translation();
        }

        // Stage 5: synthesis. Best-effort; the turn completes either way.
        session.send(ServerEvent::ProcessingTts {
            message: "Generating audio response...".to_string(),
        });
        let (audio_base64, tts_error) = match self
            .services
            .tts
            .synthesize(&reply_text, &source_language)
            .await
        {
            Ok(bytes) => (Some(BASE64_STANDARD.encode(bytes)), false),
            Err(err) => {
                warn!(
                    client_id = %session.client_id,
                    error = %err,
                    "Synthesis failed, completing turn as text-only"
                );
                (None, true)
            }
        };
        run.mark_tts();

        // Persist both turns off the critical path.
        self.history.enqueue(
            &history_session,
            Turn {
                role: Role::User,
                content: user_content,
                audio_ref: None,
                transcription,
                received_at: Some(run.received_at),
                stt_done_at: run.stt_done_at,
                llm_done_at: None,
                tts_done_at: None,
                timestamp: Utc::now(),
            },
        );
        self.history.enqueue(
            &history_session,
            Turn {
                role: Role::Assistant,
                content: reply_text.clone(),
                audio_ref: None,
                transcription: None,
                received_at: None,
                stt_done_at: None,
                llm_done_at: run.llm_done_at,
                tts_done_at: run.tts_done_at,
                timestamp: Utc::now(),
            },
        );

        Ok(TurnReply {
            text: reply_text,
            audio_base64,
            navigation_url: outcome.navigation_url,
            tts_error,
        })
    }

    /// Ask the chat model for an intent label, with the session's recent
    /// history as context.
    async fn classify(
        &self,
        history_session: &str,
        utterance: &str,
    ) -> Result<String, PipelineError> {
        let mut turns = vec![ChatTurn::new("system", CLASSIFIER_PROMPT)];

        let stored = self.store.turns(history_session);
        let mut recent: Vec<&Turn> = stored
            .iter()
            .filter(|turn| turn.role != Role::System)
            .rev()
            .take(self.settings.llm_history_window)
            .collect();
        recent.reverse();
        for turn in recent {
            turns.push(ChatTurn::new(turn.role.as_str(), turn.content.clone()));
        }

        turns.push(ChatTurn::new("user", utterance));

        self.services.chat.complete(&turns).await
    }
}
