use std::{
    fmt::Display,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};
use uuid::Uuid;
use dashmap::DashMap;
use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, instrument, warn};
use tungstenite::Message;

/// Represents a connected client and the queue feeding its socket.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for the client.
    pub id: Uuid,
    /// Socket address of the client.
    pub addr: SocketAddr,
    /// Timestamp of the client's last inbound activity.
    last_activity: Arc<Mutex<Instant>>,
    /// Channel sender for queueing messages to the client.
    sender: mpsc::Sender<Message>,
}

impl Client {
    /// Creates a new `Client` and the receiving end of its outbound queue,
    /// which holds at most `queue_depth` messages.
    ///
    /// The receiver is usually handed to [`pump_outbound`] together with the
    /// socket's write half.
    pub fn new(addr: SocketAddr, queue_depth: usize) -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));

        let client = Client {
            id: Uuid::new_v4(),
            addr,
            last_activity: Arc::new(Mutex::new(Instant::now())),
            sender,
        };

        (client, receiver)
    }

    /// Queues a message for the client without waiting on the socket.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::QueueFull` if the writer has fallen
    /// `queue_depth` messages behind, or `ClientError::SendFailed` if it has
    /// gone away.
    pub fn send(&self, message: Message) -> Result<(), ClientError> {
        self.sender.try_send(message).map_err(|e| {
            debug!("Failed to queue message for {}: {}", self.id, e);
            match e {
                TrySendError::Full(_) => ClientError::QueueFull,
                TrySendError::Closed(_) => ClientError::SendFailed,
            }
        })
    }

    /// Records inbound activity for the heartbeat.
    pub fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the client last sent anything.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap_or_else(PoisonError::into_inner).elapsed()
    }

    /// Checks if the client's writer is still draining the queue.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queues a close frame.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SendFailed` if the writer has already stopped.
    pub fn close(&self) -> Result<(), ClientError> {
        self.send(Message::Close(None))
    }
}

/// Drains a client's queue into the socket's write half until either side
/// closes. Stops after forwarding a close frame.
pub async fn pump_outbound<W>(mut writer: W, mut receiver: mpsc::Receiver<Message>)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    while let Some(msg) = receiver.recv().await {
        let closing = msg.is_close();
        if let Err(e) = writer.send(msg).await {
            debug!("Failed to send message: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
}

/// Manages multiple client connections.
#[derive(Clone, Default)]
pub struct ClientManager {
    /// A concurrent map storing active clients.
    clients: Arc<DashMap<Uuid, Client>>,
}

impl ClientManager {
    /// Creates a new `ClientManager` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new client to the manager.
    pub fn add(&self, client: Client) {
        self.clients.insert(client.id, client);
    }

    /// Removes a client from the manager by ID.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if no client has that ID.
    pub fn remove(&self, id: &Uuid) -> Result<Client, ClientError> {
        self.clients
            .remove(id)
            .map(|(_, client)| client)
            .ok_or(ClientError::NotFound)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.clients.contains_key(id)
    }

    /// Cleans up disconnected clients from the manager.
    pub fn cleanup(&self) {
        self.clients.retain(|_, client| {
            let connected = client.is_connected();
            if !connected {
                debug!("Removing disconnected client: {}", client.id);
            }
            connected
        });
    }

    /// Queues a close frame for every client and empties the registry.
    pub fn close_all(&self) {
        self.clients.iter().for_each(|entry| {
            let _ = entry.value().close();
        });
        self.clients.clear();
    }

    /// Broadcasts a message to all connected clients.
    ///
    /// Never waits on a socket. Clients whose queue is closed or full are
    /// removed after the fan-out. Returns the number of clients the message
    /// was queued for.
    #[instrument(skip(self, message))]
    pub fn broadcast(&self, message: Message) -> usize {
        let mut failed = Vec::new();
        let mut delivered = 0;

        self.clients.iter().for_each(|entry| {
            match entry.value().send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(ClientError::QueueFull) => {
                    warn!("Dropping lagging client {}", entry.key());
                    failed.push(*entry.key());
                }
                Err(e) => {
                    error!("Broadcast failed to {}: {}", entry.key(), e);
                    failed.push(*entry.key());
                }
            }
        });

        for id in failed {
            self.clients.remove(&id);
        }

        delivered
    }
}

/// Represents errors that may occur in client operations.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Failed to send message")]
    SendFailed,
    #[error("Outbound queue is full")]
    QueueFull,
    #[error("Client not found")]
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[test]
    fn broadcast_reaches_every_client() {
        let manager = ClientManager::new();
        let (a, mut rx_a) = Client::new(addr(), 8);
        let (b, mut rx_b) = Client::new(addr(), 8);
        manager.add(a);
        manager.add(b);

        assert_eq!(manager.broadcast(Message::Text("hi".into())), 2);
        assert_eq!(rx_a.try_recv().unwrap(), Message::Text("hi".into()));
        assert_eq!(rx_b.try_recv().unwrap(), Message::Text("hi".into()));
    }

    #[test]
    fn broadcast_drops_closed_clients() {
        let manager = ClientManager::new();
        let (alive, _rx_alive) = Client::new(addr(), 8);
        let (gone, rx_gone) = Client::new(addr(), 8);
        manager.add(alive);
        manager.add(gone.clone());
        drop(rx_gone);

        assert_eq!(manager.broadcast(Message::Text("hi".into())), 1);
        assert_eq!(manager.len(), 1);
        assert!(matches!(manager.remove(&gone.id), Err(ClientError::NotFound)));
    }

    #[test]
    fn cleanup_keeps_live_clients() {
        let manager = ClientManager::new();
        let (alive, _rx_alive) = Client::new(addr(), 8);
        let (gone, rx_gone) = Client::new(addr(), 8);
        manager.add(alive.clone());
        manager.add(gone);
        drop(rx_gone);

        manager.cleanup();
        assert_eq!(manager.len(), 1);
        assert!(manager.remove(&alive.id).is_ok());
        assert!(manager.is_empty());
    }

    #[test]
    fn stalled_client_does_not_hold_up_the_others() {
        let manager = ClientManager::new();
        let (stalled, _rx_stalled) = Client::new(addr(), 2);
        let (healthy, mut rx_healthy) = Client::new(addr(), 16);
        manager.add(stalled.clone());
        manager.add(healthy);

        let delivered: Vec<usize> = (0..5)
            .map(|n| manager.broadcast(Message::Text(n.to_string())))
            .collect();

        assert_eq!(delivered, vec![2, 2, 1, 1, 1]);
        assert!(!manager.contains(&stalled.id));
        assert_eq!(manager.len(), 1);
        for n in 0..5 {
            assert_eq!(rx_healthy.try_recv().unwrap(), Message::Text(n.to_string()));
        }
        assert!(matches!(stalled.send(Message::Text("late".into())), Err(ClientError::QueueFull)));
    }
}
