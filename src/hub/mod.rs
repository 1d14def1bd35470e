//! Real-time fan-out hub (spec §4.5): a single event-loop task that holds
//! all live WebSocket client mailboxes and fans broadcast messages out to
//! the clients subscribed to a topic (or to everyone, for topic-less
//! messages).

pub mod envelope;

pub use envelope::{ClientMessage, Envelope, EventType};

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

const CLIENT_MAILBOX_CAPACITY: usize = 64;
const HUB_COMMAND_CAPACITY: usize = 1024;

/// A broadcast's addressing: a specific lobby room, or every connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Lobby(Uuid),
    Global,
}

enum HubCommand {
    Register {
        client_id: Uuid,
        mailbox: mpsc::Sender<Envelope>,
    },
    SubscribeLobby {
        client_id: Uuid,
        lobby_id: Uuid,
    },
    Unregister {
        client_id: Uuid,
    },
    Broadcast {
        topic: Topic,
        envelope: Box<Envelope>,
    },
    Shutdown,
}

struct ClientEntry {
    lobby_id: Option<Uuid>,
    mailbox: mpsc::Sender<Envelope>,
}

/// Handle callers use to register clients and publish events. The actual
/// client table lives in the spawned event-loop task, never shared
/// directly, matching spec §4.5's single-event-loop scheduling model.
pub struct FanOutHub {
    commands: mpsc::Sender<HubCommand>,
}

/// A registered client's receiving half plus the id the hub now knows it by.
pub struct ClientHandle {
    pub client_id: Uuid,
    pub receiver: mpsc::Receiver<Envelope>,
}

impl FanOutHub {
    /// Spawns the event loop and returns a handle to it. Dropping every
    /// handle clone closes the command channel and ends the loop; callers
    /// that want an orderly shutdown should call [`FanOutHub::shutdown`]
    /// instead so in-flight broadcasts land first.
    pub fn spawn() -> std::sync::Arc<Self> {
        let (tx, rx) = mpsc::channel(HUB_COMMAND_CAPACITY);
        tokio::spawn(run_event_loop(rx));
        std::sync::Arc::new(FanOutHub { commands: tx })
    }

    pub async fn register(&self) -> ClientHandle {
        let client_id = Uuid::new_v4();
        let (mailbox_tx, mailbox_rx) = mpsc::channel(CLIENT_MAILBOX_CAPACITY);
        let _ = self
            .commands
            .send(HubCommand::Register {
                client_id,
                mailbox: mailbox_tx,
            })
            .await;
        ClientHandle {
            client_id,
            receiver: mailbox_rx,
        }
    }

    /// A connection may be in at most one lobby room at a time (spec §4.5);
    /// subscribing again simply replaces the prior room.
    pub async fn subscribe_lobby(&self, client_id: Uuid, lobby_id: Uuid) {
        let _ = self
            .commands
            .send(HubCommand::SubscribeLobby { client_id, lobby_id })
            .await;
    }

    pub async fn unregister(&self, client_id: Uuid) {
        let _ = self.commands.send(HubCommand::Unregister { client_id }).await;
    }

    pub async fn broadcast(&self, topic: Topic, envelope: Envelope) {
        let _ = self
            .commands
            .send(HubCommand::Broadcast {
                topic,
                envelope: Box::new(envelope),
            })
            .await;
    }

    /// Closes all client send channels, then the loop itself (spec §4.5 Shutdown).
    pub async fn shutdown(&self) {
        let _ = self.commands.send(HubCommand::Shutdown).await;
    }
}

async fn run_event_loop(mut commands: mpsc::Receiver<HubCommand>) {
    let mut clients: HashMap<Uuid, ClientEntry> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Register { client_id, mailbox } => {
                clients.insert(
                    client_id,
                    ClientEntry {
                        lobby_id: None,
                        mailbox,
                    },
                );
            }
            HubCommand::SubscribeLobby { client_id, lobby_id } => {
                if let Some(entry) = clients.get_mut(&client_id) {
                    entry.lobby_id = Some(lobby_id);
                }
            }
            HubCommand::Unregister { client_id } => {
                clients.remove(&client_id);
            }
            HubCommand::Broadcast { topic, envelope } => {
                for (client_id, entry) in clients.iter() {
                    let matches = match topic {
                        Topic::Global => true,
                        Topic::Lobby(lobby_id) => entry.lobby_id == Some(lobby_id),
                    };
                    if !matches {
                        continue;
                    }
                    // Never block the broadcaster: drop and warn on a full mailbox (spec §4.5).
                    if entry.mailbox.try_send((*envelope).clone()).is_err() {
                        warn!(%client_id, "dropping event for client with full mailbox");
                    }
                }
            }
            HubCommand::Shutdown => {
                clients.clear();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: EventType, lobby_id: Option<Uuid>) -> Envelope {
        Envelope::new(event_type, lobby_id, None, json!({}), 0)
    }

    #[tokio::test]
    async fn broadcast_reaches_only_room_subscribers() {
        let hub = FanOutHub::spawn();
        let mut a = hub.register().await;
        let mut b = hub.register().await;

        let lobby_id = Uuid::new_v4();
        hub.subscribe_lobby(a.client_id, lobby_id).await;

        hub.broadcast(Topic::Lobby(lobby_id), envelope(EventType::LobbyUpdate, Some(lobby_id)))
            .await;

        let received = a.receiver.recv().await;
        assert!(received.is_some());

        // b never subscribed, so it should not receive the room broadcast.
        let timeout = tokio::time::timeout(std::time::Duration::from_millis(50), b.receiver.recv()).await;
        assert!(timeout.is_err());
    }

    #[tokio::test]
    async fn global_broadcast_reaches_every_client() {
        let hub = FanOutHub::spawn();
        let mut a = hub.register().await;
        let mut b = hub.register().await;

        hub.broadcast(Topic::Global, envelope(EventType::MatchStarting, None)).await;

        assert!(a.receiver.recv().await.is_some());
        assert!(b.receiver.recv().await.is_some());
    }

    #[tokio::test]
    async fn unregister_stops_further_delivery() {
        let hub = FanOutHub::spawn();
        let handle = hub.register().await;
        let client_id = handle.client_id;
        let mut receiver = handle.receiver;
        hub.unregister(client_id).await;

        hub.broadcast(Topic::Global, envelope(EventType::MatchStarting, None)).await;
        let timeout = tokio::time::timeout(std::time::Duration::from_millis(50), receiver.recv()).await;
        assert!(timeout.is_err());
    }
}
