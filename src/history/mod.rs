//! # Conversation History Module
//!
//! Persistence of turns is an external concern to the pipeline: the
//! orchestrator hands finished turns to a bounded background queue and
//! never waits for storage. The store itself sits behind the
//! [`HistoryStore`] trait so the in-memory implementation can be swapped
//! for a database-backed one without touching the pipeline.
//!
//! ## Key Components:
//! - **Turn / SessionRecord**: immutable per-message records with stage
//!   completion timestamps
//! - **HistoryStore**: repository interface (append, query, session
//!   lifecycle, active-session switching)
//! - **HistoryWriter**: bounded fire-and-forget write queue with a flush
//!   hook for tests

pub mod store;
pub mod writer;

pub use store::{HistoryStore, InMemoryHistoryStore, Role, SessionRecord, Turn};
pub use writer::HistoryWriter;
