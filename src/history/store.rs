//! # History Store
//!
//! Append-only log of conversation turns, grouped into sessions per user.
//! A user has at most one *active* session at a time; reconnecting clients
//! resume it, and the session endpoints allow listing and switching.
//!
//! The in-memory implementation mirrors the repository interface a
//! database-backed store would expose; everything observable by callers
//! goes through the [`HistoryStore`] trait.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// System prompt seeded into every new session.
pub const SYSTEM_PROMPT: &str = "You are FarmSocial AI, a helpful assistant for Kannada-speaking \
farmers. Respond naturally and informatively in Kannada based on the user's voice or text input.";

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One immutable conversation turn.
///
/// Produced exactly once per processed message and never mutated after
/// creation. Stage-completion timestamps are Unix milliseconds; only the
/// stages that actually ran for the message are populated.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,

    /// Reference to stored audio, when the turn originated from audio input
    pub audio_ref: Option<String>,

    /// STT transcript, when the turn originated from audio input
    pub transcription: Option<String>,

    pub received_at: Option<i64>,
    pub stt_done_at: Option<i64>,
    pub llm_done_at: Option<i64>,
    pub tts_done_at: Option<i64>,

    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Plain text turn with no stage timestamps (system prompts, tests).
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            audio_ref: None,
            transcription: None,
            received_at: None,
            stt_done_at: None,
            llm_done_at: None,
            tts_done_at: None,
            timestamp: Utc::now(),
        }
    }
}

/// Metadata for one stored session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    pub is_active: bool,
}

/// Repository interface for conversation history.
///
/// All operations are whole-store atomic; implementations must be safe
/// under arbitrary concurrent callers.
pub trait HistoryStore: Send + Sync {
    /// Append a turn to a session. Unknown session ids are logged and
    /// dropped by implementations, never errors on the write path.
    fn append_turn(&self, session_id: &str, turn: Turn);

    /// All turns of a session in append order. Empty for unknown ids.
    fn turns(&self, session_id: &str) -> Vec<Turn>;

    /// Create a new session for a user, seed it with the system prompt,
    /// and make it the active session.
    fn create_session(&self, user_id: &str) -> String;

    /// The user's active session, creating one if none exists.
    fn get_or_create_active_session(&self, user_id: &str) -> String;

    /// Make the given session the user's active one. Returns false when
    /// the session does not exist for that user.
    fn switch_active_session(&self, user_id: &str, session_id: &str) -> bool;

    /// All sessions of a user, most recently created first.
    fn sessions(&self, user_id: &str) -> Vec<SessionRecord>;
}

#[derive(Default)]
struct StoreInner {
    /// user id -> session records (in creation order)
    users: HashMap<String, Vec<SessionRecord>>,

    /// session id -> turns (in append order)
    turns: HashMap<String, Vec<Turn>>,
}

/// In-memory [`HistoryStore`] implementation.
pub struct InMemoryHistoryStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append_turn(&self, session_id: &str, turn: Turn) {
        let mut inner = self.inner.write().unwrap();

        match inner.turns.get_mut(session_id) {
            Some(turns) => turns.push(turn),
            None => {
                tracing::warn!(session_id, "Dropping turn for unknown session");
                return;
            }
        }

        // Touch the owning session's last-interaction time
        for records in inner.users.values_mut() {
            if let Some(record) = records.iter_mut().find(|r| r.session_id == session_id) {
                record.last_interaction = Utc::now();
                break;
            }
        }
    }

    fn turns(&self, session_id: &str) -> Vec<Turn> {
        let inner = self.inner.read().unwrap();
        inner.turns.get(session_id).cloned().unwrap_or_default()
    }

    fn create_session(&self, user_id: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut inner = self.inner.write().unwrap();
        let records = inner.users.entry(user_id.to_string()).or_default();

        // A freshly created session becomes the active one
        for record in records.iter_mut() {
            record.is_active = false;
        }
        records.push(SessionRecord {
            session_id: session_id.clone(),
            created_at: now,
            last_interaction: now,
            is_active: true,
        });

        inner
            .turns
            .insert(session_id.clone(), vec![Turn::text(Role::System, SYSTEM_PROMPT)]);

        tracing::info!(user_id, session_id = %session_id, "Created history session");
        session_id
    }

    fn get_or_create_active_session(&self, user_id: &str) -> String {
        {
            let inner = self.inner.read().unwrap();
            if let Some(records) = inner.users.get(user_id) {
                // Most recently interacted active session wins
                if let Some(record) = records
                    .iter()
                    .filter(|r| r.is_active)
                    .max_by_key(|r| r.last_interaction)
                {
                    return record.session_id.clone();
                }
            }
        }

        self.create_session(user_id)
    }

    fn switch_active_session(&self, user_id: &str, session_id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let Some(records) = inner.users.get_mut(user_id) else {
            return false;
        };

        if !records.iter().any(|r| r.session_id == session_id) {
            return false;
        }

        for record in records.iter_mut() {
            record.is_active = record.session_id == session_id;
            if record.is_active {
                record.last_interaction = Utc::now();
            }
        }
        true
    }

    fn sessions(&self, user_id: &str) -> Vec<SessionRecord> {
        let inner = self.inner.read().unwrap();
        let mut records = inner.users.get(user_id).cloned().unwrap_or_default();
        records.reverse();
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_seeds_system_prompt() {
        let store = InMemoryHistoryStore::new();
        let session_id = store.create_session("farmer-1");

        let turns = store.turns(&session_id);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[0].content, SYSTEM_PROMPT);
    }

    #[test]
    fn test_append_preserves_order() {
        let store = InMemoryHistoryStore::new();
        let session_id = store.create_session("farmer-1");

        store.append_turn(&session_id, Turn::text(Role::User, "first"));
        store.append_turn(&session_id, Turn::text(Role::Assistant, "second"));
        store.append_turn(&session_id, Turn::text(Role::User, "third"));

        let contents: Vec<_> = store
            .turns(&session_id)
            .iter()
            .map(|t| t.content.clone())
            .collect();
        assert_eq!(contents, vec![SYSTEM_PROMPT, "first", "second", "third"]);
    }

    #[test]
    fn test_append_to_unknown_session_is_dropped() {
        let store = InMemoryHistoryStore::new();
        store.append_turn("no-such-session", Turn::text(Role::User, "hello"));
        assert!(store.turns("no-such-session").is_empty());
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let store = InMemoryHistoryStore::new();
        let first = store.get_or_create_active_session("farmer-1");
        let second = store.get_or_create_active_session("farmer-1");
        assert_eq!(first, second);
    }

    #[test]
    fn test_create_session_deactivates_previous() {
        let store = InMemoryHistoryStore::new();
        let first = store.create_session("farmer-1");
        let second = store.create_session("farmer-1");
        assert_ne!(first, second);
        assert_eq!(store.get_or_create_active_session("farmer-1"), second);

        let records = store.sessions("farmer-1");
        assert_eq!(records.len(), 2);
        assert_eq!(records.iter().filter(|r| r.is_active).count(), 1);
    }

    #[test]
    fn test_switch_active_session() {
        let store = InMemoryHistoryStore::new();
        let first = store.create_session("farmer-1");
        let _second = store.create_session("farmer-1");

        assert!(store.switch_active_session("farmer-1", &first));
        assert_eq!(store.get_or_create_active_session("farmer-1"), first);

        assert!(!store.switch_active_session("farmer-1", "no-such-session"));
        assert!(!store.switch_active_session("farmer-2", &first));
    }
}
