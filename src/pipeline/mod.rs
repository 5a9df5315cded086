//! # Message Pipeline Module
//!
//! Everything that happens between receiving one client message and
//! emitting its terminal frame:
//!
//! - **events**: the frame vocabulary of the connection protocol (inbound
//!   tagged union, outbound status/terminal frames, stage timings)
//! - **orchestrator**: drives the fixed stage sequence (normalize → STT →
//!   dialog → translate → TTS) with a status frame before each stage and
//!   exactly one terminal frame per message
//!
//! ## Ordering Guarantee:
//! Within one session, every frame of message N precedes every frame of
//! message N+1 (the WebSocket actor holds back queued messages until the
//! terminal frame went out). Across sessions there is no ordering.

pub mod events;
pub mod orchestrator;

pub use events::{Inbound, ServerEvent, StagePerformance};
pub use orchestrator::{PipelineOrchestrator, TurnInput};
