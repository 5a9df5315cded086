//! # Session Module
//!
//! One session exists per connected client, created on connect and
//! destroyed on disconnect. This module owns:
//!
//! - **SessionRegistry**: the only state shared between connection tasks;
//!   thread-safe connect/disconnect/get over the client-id map
//! - **DialogEngine**: the deterministic slot-filling state machine that
//!   lives inside each session and decides what the assistant says next
//!
//! ## Session Lifecycle:
//! 1. **Connect**: registry entry created (replacing any previous one for
//!    the same client id), fresh dialog state
//! 2. **Turns**: the pipeline orchestrator drives the dialog state, one
//!    message at a time
//! 3. **Disconnect**: registry entry removed, dialog state discarded

pub mod dialog;
pub mod registry;

pub use dialog::{DialogDecision, DialogOutcome, DialogState, Intent};
pub use registry::{OutboundFrame, Session, SessionRegistry};
