use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use chatdrop_shared::ServerEvent;

/// Outbound frames buffered per client before new ones are dropped.
const CLIENT_QUEUE_DEPTH: usize = 256;

/// Registry of connected realtime clients.
///
/// Each client owns the receiving end of a bounded queue; its connection
/// task drains the queue into the socket.
#[derive(Clone)]
pub struct ClientHub {
    clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a client. Returns its id and the queue of frames to send.
    pub async fn join(&self) -> (Uuid, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel::<String>(CLIENT_QUEUE_DEPTH);
        let client_id = Uuid::new_v4();

        let mut clients = self.clients.write().await;
        clients.insert(client_id, tx);

        info!(
            client = %client_id,
            clients = clients.len(),
            "Client joined"
        );

        (client_id, rx)
    }

    pub async fn leave(&self, client_id: &Uuid) {
        let mut clients = self.clients.write().await;
        if clients.remove(client_id).is_some() {
            info!(
                client = %client_id,
                clients = clients.len(),
                "Client left"
            );
        }
    }

    /// Push an event to every connected client, the originator included.
    ///
    /// Fire-and-forget: a client whose queue is full or closed misses the
    /// event. Returns how many clients it was queued for.
    pub async fn broadcast(&self, event: &ServerEvent) -> usize {
        let frame = match event.to_text() {
            Ok(frame) => frame,
            Err(e) => {
                error!(event = event.name(), error = %e, "Failed to serialize event");
                return 0;
            }
        };

        let clients = self.clients.read().await;
        let mut delivered = 0;
        for (client_id, tx) in clients.iter() {
            if tx.try_send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(
                    client = %client_id,
                    event = event.name(),
                    "Dropping event for slow or closed client"
                );
            }
        }

        debug!(event = event.name(), delivered, clients = clients.len(), "Broadcast");
        delivered
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}
