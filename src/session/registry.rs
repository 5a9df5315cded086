//! # Session Registry
//!
//! Thread-safe mapping from client id to the live session: the connection
//! handle plus the dialog state. This map is the only state mutated by
//! more than one task at a time; every mutation goes through
//! `connect`/`disconnect`, never through direct field writes.
//!
//! ## Reconnect Semantics:
//! `connect` is idempotent per client id. Reconnecting replaces the whole
//! `Session` object: the old connection handle and the old dialog state
//! are discarded together, so an in-flight pipeline run from before the
//! reconnect can only ever touch the orphaned object, never the new one.

use crate::pipeline::events::ServerEvent;
use crate::session::dialog::DialogState;
use actix::prelude::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Actor message carrying one outbound frame to a connection.
#[derive(Message)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub ServerEvent);

/// One connected client.
///
/// The dialog state lives behind a Mutex but is only ever touched by the
/// session's single in-flight pipeline run (the WebSocket actor enforces
/// single-flight), so the lock is uncontended in practice.
pub struct Session {
    pub client_id: String,

    /// Monotonic connection generation; bumped on every (re)connect
    pub generation: u64,

    pub connected_at: DateTime<Utc>,

    recipient: Recipient<OutboundFrame>,

    dialog: Mutex<DialogState>,
}

impl Session {
    /// Push a frame to the client. Frames to a closed connection land in
    /// the actor's dead letter box and are dropped silently.
    pub fn send(&self, event: ServerEvent) {
        self.recipient.do_send(OutboundFrame(event));
    }

    /// Run a closure against the session's dialog state.
    pub fn with_dialog<T>(&self, f: impl FnOnce(&mut DialogState) -> T) -> T {
        let mut dialog = self.dialog.lock().unwrap();
        f(&mut dialog)
    }
}

/// Thread-safe registry of active sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Register a connection under the given client id.
    ///
    /// Idempotent per id: an existing entry is replaced, its dialog state
    /// discarded with it. Returns the fresh session.
    pub fn connect(&self, client_id: &str, recipient: Recipient<OutboundFrame>) -> Arc<Session> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session {
            client_id: client_id.to_string(),
            generation,
            connected_at: Utc::now(),
            recipient,
            dialog: Mutex::new(DialogState::new()),
        });

        let mut sessions = self.sessions.write().unwrap();
        let replaced = sessions.insert(client_id.to_string(), session.clone());

        if let Some(old) = replaced {
            debug!(
                client_id,
                old_generation = old.generation,
                new_generation = generation,
                "Replaced existing session on reconnect"
            );
        }
        info!(client_id, generation, total = sessions.len(), "Client connected");

        session
    }

    /// Remove a session.
    ///
    /// A no-op when the stored generation differs from the caller's: a
    /// disconnect of a stale connection must not tear down its
    /// replacement.
    pub fn disconnect(&self, client_id: &str, generation: u64) {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get(client_id) {
            Some(session) if session.generation == generation => {
                let connected_secs = Utc::now()
                    .signed_duration_since(session.connected_at)
                    .num_seconds();
                sessions.remove(client_id);
                info!(
                    client_id,
                    generation,
                    connected_secs,
                    total = sessions.len(),
                    "Client disconnected"
                );
            }
            Some(_) => {
                debug!(client_id, generation, "Stale disconnect ignored");
            }
            None => {}
        }
    }

    /// Look up a session. Unknown ids are terminal for the current
    /// message, not retryable.
    pub fn get(&self, client_id: &str) -> Result<Arc<Session>, crate::error::PipelineError> {
        let sessions = self.sessions.read().unwrap();
        sessions
            .get(client_id)
            .cloned()
            .ok_or_else(|| crate::error::PipelineError::SessionNotFound(client_id.to_string()))
    }

    /// Whether the given session is still the registered one for its id.
    pub fn is_current(&self, session: &Session) -> bool {
        let sessions = self.sessions.read().unwrap();
        sessions
            .get(&session.client_id)
            .map(|current| current.generation == session.generation)
            .unwrap_or(false)
    }

    /// Number of connected sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    /// Minimal actor standing in for a WebSocket connection.
    struct DeadEnd;

    impl Actor for DeadEnd {
        type Context = Context<Self>;
    }

    impl Handler<OutboundFrame> for DeadEnd {
        type Result = ();
        fn handle(&mut self, _msg: OutboundFrame, _ctx: &mut Self::Context) {}
    }

    fn recipient() -> Recipient<OutboundFrame> {
        DeadEnd.start().recipient()
    }

    #[actix_web::test]
    async fn test_connect_get_disconnect() {
        let registry = SessionRegistry::new();
        let session = registry.connect("web-1", recipient());

        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.get("web-1").unwrap().generation, session.generation);

        registry.disconnect("web-1", session.generation);
        assert_eq!(registry.active_count(), 0);
        assert!(matches!(
            registry.get("web-1"),
            Err(PipelineError::SessionNotFound(id)) if id == "web-1"
        ));
    }

    #[actix_web::test]
    async fn test_reconnect_replaces_session_and_dialog() {
        let registry = SessionRegistry::new();
        let first = registry.connect("web-1", recipient());
        first.with_dialog(|dialog| {
            dialog.step("add product", Some("product"), crate::session::dialog::Intent::ProductListing);
        });
        assert!(first.with_dialog(|d| d.intent().is_some()));

        let second = registry.connect("web-1", recipient());
        assert_eq!(registry.active_count(), 1);
        assert!(second.generation > first.generation);
        // The replacement starts from a fresh dialog state
        assert!(second.with_dialog(|d| d.intent().is_none()));
        assert!(!registry.is_current(&first));
        assert!(registry.is_current(&second));
    }

    #[actix_web::test]
    async fn test_stale_disconnect_does_not_remove_replacement() {
        let registry = SessionRegistry::new();
        let first = registry.connect("web-1", recipient());
        let second = registry.connect("web-1", recipient());

        // The first connection's close handler fires late
        registry.disconnect("web-1", first.generation);
        assert_eq!(registry.active_count(), 1);
        assert!(registry.is_current(&second));
    }

    #[actix_web::test]
    async fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new();
        let a = registry.connect("web-a", recipient());
        let b = registry.connect("web-b", recipient());

        a.with_dialog(|dialog| {
            dialog.step("add product", Some("product"), crate::session::dialog::Intent::ProductListing);
        });

        assert!(a.with_dialog(|d| d.intent().is_some()));
        assert!(b.with_dialog(|d| d.intent().is_none()));
        assert_eq!(registry.active_count(), 2);
    }
}
