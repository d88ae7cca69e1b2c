/*!
 * In-process connection registry (§4.6).
 *
 * Two maps, guarded independently: direct devices by `device_id`, host
 * clients by `client_id` (paired with the owning tenant, so a webhook
 * dispatch can target a client without a round trip to the database).
 * Grounded on the reference `ClientConnectionManager`'s dict-of-connections
 * shape, generalized to cover both agent styles and re-expressed with
 * channels instead of raw socket handles: installing a new sender for an
 * already-occupied key drops the old one, which ends that connection's
 * outbound-receive loop and closes its socket — this is the Rust-idiomatic
 * equivalent of the reference's explicit "close existing connection first".
 *
 * A superseded connection's own cleanup must not then remove its successor's
 * entry. `release_device`/`release_client` compare the caller's sender
 * against whatever is currently registered (`Sender::same_channel`) and only
 * remove on a match; `unregister_device`/`unregister_client` remove
 * unconditionally and are for callers with no sender of their own to compare
 * (e.g. deleting a device outright).
 */

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

pub type Outbox = mpsc::Sender<Value>;

#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<Uuid, Outbox>>,
    clients: Mutex<HashMap<Uuid, (Outbox, String)>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `tx` for `device_id`, superseding any existing connection.
    pub async fn register_device(&self, device_id: Uuid, tx: Outbox) {
        self.devices.lock().await.insert(device_id, tx);
    }

    /// Unconditional remove, for callers with no sender of their own to
    /// compare against (e.g. deleting the device outright).
    pub async fn unregister_device(&self, device_id: Uuid) {
        self.devices.lock().await.remove(&device_id);
    }

    /// Removes `device_id`'s entry only if it is still `tx`. A connection
    /// that has already been superseded must call this instead of
    /// `unregister_device` on disconnect, or its cleanup would evict its
    /// successor.
    pub async fn release_device(&self, device_id: Uuid, tx: &Outbox) {
        let mut devices = self.devices.lock().await;
        if devices.get(&device_id).is_some_and(|current| current.same_channel(tx)) {
            devices.remove(&device_id);
        }
    }

    pub async fn is_device_connected(&self, device_id: Uuid) -> bool {
        self.devices.lock().await.contains_key(&device_id)
    }

    /// Attempts an immediate send, releasing a dead channel on failure
    /// (§4.6 step 3) — the release compares against the sender this call
    /// just used, so it can never evict a connection that superseded it.
    pub async fn send_to_device(&self, device_id: Uuid, message: Value) -> bool {
        let tx = self.devices.lock().await.get(&device_id).cloned();
        match tx {
            Some(tx) => {
                if tx.send(message).await.is_ok() {
                    true
                } else {
                    self.release_device(device_id, &tx).await;
                    false
                }
            }
            None => false,
        }
    }

    pub async fn register_client(&self, client_id: Uuid, tenant: String, tx: Outbox) {
        self.clients.lock().await.insert(client_id, (tx, tenant));
    }

    pub async fn unregister_client(&self, client_id: Uuid) {
        self.clients.lock().await.remove(&client_id);
    }

    /// Client analogue of `release_device`.
    pub async fn release_client(&self, client_id: Uuid, tx: &Outbox) {
        let mut clients = self.clients.lock().await;
        if clients
            .get(&client_id)
            .is_some_and(|(current, _)| current.same_channel(tx))
        {
            clients.remove(&client_id);
        }
    }

    pub async fn is_client_connected(&self, client_id: Uuid) -> bool {
        self.clients.lock().await.contains_key(&client_id)
    }

    pub async fn send_to_client(&self, client_id: Uuid, message: Value) -> bool {
        let tx = self
            .clients
            .lock()
            .await
            .get(&client_id)
            .map(|(tx, _)| tx.clone());
        match tx {
            Some(tx) => {
                if tx.send(message).await.is_ok() {
                    true
                } else {
                    self.release_client(client_id, &tx).await;
                    false
                }
            }
            None => false,
        }
    }

    pub async fn device_count(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_send_to_device() {
        let registry = DeviceRegistry::new();
        let device_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register_device(device_id, tx).await;

        assert!(registry.send_to_device(device_id, serde_json::json!({"a": 1})).await);
        assert_eq!(rx.recv().await, Some(serde_json::json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_send_to_unregistered_device_fails() {
        let registry = DeviceRegistry::new();
        assert!(!registry.send_to_device(Uuid::new_v4(), serde_json::json!({})).await);
    }

    #[tokio::test]
    async fn test_supersession_closes_old_channel() {
        let registry = DeviceRegistry::new();
        let device_id = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        registry.register_device(device_id, tx1).await;
        registry.register_device(device_id, tx2).await;

        // tx1 was dropped when superseded, so its receiver observes a closed channel.
        assert_eq!(rx1.recv().await, None);
    }

    #[tokio::test]
    async fn test_unregister_removes_entry() {
        let registry = DeviceRegistry::new();
        let device_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(4);
        registry.register_device(device_id, tx).await;
        assert!(registry.is_device_connected(device_id).await);

        registry.unregister_device(device_id).await;
        assert!(!registry.is_device_connected(device_id).await);
    }

    #[tokio::test]
    async fn test_release_after_supersession_does_not_evict_successor() {
        let registry = DeviceRegistry::new();
        let device_id = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);

        registry.register_device(device_id, tx1.clone()).await;
        registry.register_device(device_id, tx2).await;

        // The superseded connection's own cleanup must be a no-op: it is
        // releasing a sender that is no longer the one installed.
        registry.release_device(device_id, &tx1).await;
        assert!(registry.is_device_connected(device_id).await);

        assert!(registry.send_to_device(device_id, serde_json::json!({"a": 1})).await);
        assert_eq!(rx2.recv().await, Some(serde_json::json!({"a": 1})));
    }
}
