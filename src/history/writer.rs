//! # Background History Writer
//!
//! Turn persistence is off the critical path: the orchestrator enqueues
//! finished turns here and immediately moves on. A single worker task
//! drains the queue into the store.
//!
//! The queue is bounded. When it fills up (a store stall, a burst of
//! traffic), new turns are dropped with a warning instead of blocking the
//! pipeline; losing history must never delay or fail a turn.
//!
//! `flush()` pushes a marker through the queue and waits for it, which
//! gives tests a deterministic way to observe everything enqueued so far.

use crate::history::store::{HistoryStore, Turn};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum WriteCommand {
    Append { session_id: String, turn: Turn },
    Flush(oneshot::Sender<()>),
}

/// Handle to the background persistence queue.
pub struct HistoryWriter {
    tx: mpsc::Sender<WriteCommand>,
}

impl HistoryWriter {
    /// Spawn the worker task and return the queue handle.
    pub fn spawn(store: Arc<dyn HistoryStore>, queue_depth: usize) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<WriteCommand>(queue_depth.max(1));

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    WriteCommand::Append { session_id, turn } => {
                        debug!(session_id = %session_id, role = turn.role.as_str(), "Persisting turn");
                        store.append_turn(&session_id, turn);
                    }
                    WriteCommand::Flush(done) => {
                        // Every append sent before the flush has already been
                        // drained at this point; just acknowledge.
                        let _ = done.send(());
                    }
                }
            }
            debug!("History writer stopped");
        });

        Arc::new(Self { tx })
    }

    /// Enqueue a turn for persistence. Never blocks; on a full queue the
    /// turn is dropped and a warning logged.
    pub fn enqueue(&self, session_id: &str, turn: Turn) {
        let command = WriteCommand::Append {
            session_id: session_id.to_string(),
            turn,
        };
        if let Err(err) = self.tx.try_send(command) {
            warn!(session_id, error = %err, "History queue full, dropping turn");
        }
    }

    /// Wait until every previously enqueued turn has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}
