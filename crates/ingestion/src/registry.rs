/*!
 * Session Registry
 *
 * In-memory index from a live session to the handle its worker task is
 * listening on. The database row is the durable source of truth (§5: "an
 * in-memory registry backed by the database for durability across
 * restarts"); this registry exists only so a disconnect request can reach
 * the worker that owns the session without a broadcast.
 */

use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub enum WorkerCommand {
    Disconnect,
}

#[derive(Default)]
pub struct SessionRegistry {
    workers: Mutex<HashMap<Uuid, mpsc::Sender<WorkerCommand>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session_id: Uuid, sender: mpsc::Sender<WorkerCommand>) {
        self.workers.lock().await.insert(session_id, sender);
    }

    pub async fn deregister(&self, session_id: Uuid) {
        self.workers.lock().await.remove(&session_id);
    }

    /// Returns `true` if a live worker was signalled. `false` means the
    /// session is already gone (not an error: disconnect is idempotent).
    pub async fn signal_disconnect(&self, session_id: Uuid) -> bool {
        if let Some(sender) = self.workers.lock().await.get(&session_id) {
            sender.send(WorkerCommand::Disconnect).await.is_ok()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_disconnect_missing_session_returns_false() {
        let registry = SessionRegistry::new();
        assert!(!registry.signal_disconnect(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_register_then_signal_disconnect() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(1);
        registry.register(session_id, tx).await;

        assert!(registry.signal_disconnect(session_id).await);
        assert!(matches!(rx.recv().await, Some(WorkerCommand::Disconnect)));
    }

    #[tokio::test]
    async fn test_deregister_removes_entry() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);
        registry.register(session_id, tx).await;
        registry.deregister(session_id).await;

        assert!(!registry.signal_disconnect(session_id).await);
    }
}
