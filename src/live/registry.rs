use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{info, warn};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Tracks every live WebSocket client's outbound queue. A send fails
/// only when the connection task has dropped its receiver, so a failed
/// send is the signal to forget the client.
pub struct ClientRegistry {
    clients: Arc<Mutex<HashMap<Uuid, UnboundedSender<String>>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register(&self, sender: UnboundedSender<String>) -> Result<Uuid, String> {
        let client_id = Uuid::new_v4();
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| "Lock poisoned".to_string())?;

        clients.insert(client_id, sender);
        info!(
            "Client {} connected - {} active connection(s)",
            client_id,
            clients.len()
        );
        Ok(client_id)
    }

    /// Unregistering a client that is already gone is a no-op.
    pub fn unregister(&self, client_id: &Uuid) {
        if let Ok(mut clients) = self.clients.lock() {
            if clients.remove(client_id).is_some() {
                info!(
                    "Client {} disconnected - {} active connection(s)",
                    client_id,
                    clients.len()
                );
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().map(|clients| clients.len()).unwrap_or(0)
    }

    /// Queues `message` to every connected client and returns how many
    /// accepted it. Clients whose queue is closed are dropped so one
    /// dead connection never stalls the rest.
    pub fn broadcast(&self, message: &str) -> usize {
        let targets: Vec<(Uuid, UnboundedSender<String>)> = match self.clients.lock() {
            Ok(clients) => clients.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
            Err(_) => return 0,
        };

        let mut delivered = 0;
        let mut dead = Vec::new();

        for (client_id, tx) in targets {
            if tx.send(message.to_string()).is_ok() {
                delivered += 1;
            } else {
                dead.push(client_id);
            }
        }

        for client_id in &dead {
            warn!("Dropping client {} after failed send", client_id);
            self.unregister(client_id);
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_broadcast_reaches_every_registered_client() {
        let registry = ClientRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register(tx_a).unwrap();
        registry.register(tx_b).unwrap();

        let delivered = registry.broadcast("tick");

        assert_eq!(delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap(), "tick");
        assert_eq!(rx_b.try_recv().unwrap(), "tick");
    }

    #[test]
    fn test_dead_client_is_dropped_and_the_rest_still_receive() {
        let registry = ClientRegistry::new();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel::<String>();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        registry.register(tx_dead).unwrap();
        registry.register(tx_live).unwrap();
        drop(rx_dead);

        let delivered = registry.broadcast("tick");

        assert_eq!(delivered, 1);
        assert_eq!(rx_live.try_recv().unwrap(), "tick");
        assert_eq!(registry.client_count(), 1);

        // later broadcasts only see the survivors
        assert_eq!(registry.broadcast("tock"), 1);
        assert_eq!(rx_live.try_recv().unwrap(), "tock");
    }

    #[test]
    fn test_unregister_is_idempotent_and_leaves_others_alone() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();
        let client_id = registry.register(tx).unwrap();
        registry.register(tx_other).unwrap();

        registry.unregister(&client_id);
        registry.unregister(&client_id);

        assert_eq!(registry.client_count(), 1);
        assert_eq!(registry.broadcast("tick"), 1);
        assert_eq!(rx_other.try_recv().unwrap(), "tick");
    }

    #[test]
    fn test_broadcast_to_empty_registry_delivers_nothing() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.broadcast("tick"), 0);
    }
}
