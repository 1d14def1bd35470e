//! WebSocket handler: upgrades the connection, registers it with the
//! fan-out hub, and relays the hub's outbound envelopes to the socket
//! while parsing the client's `subscribe_lobby` protocol message
//! (spec §4.5, §6).

use axum::{
    extract::{ws::Message, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tracing::{debug, info};

use crate::hub::{ClientMessage, Envelope};
use crate::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: axum::extract::ws::WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let client = state.hub.register().await;
    let client_id = client.client_id;
    let mut mailbox = client.receiver;

    info!(%client_id, "websocket connection established");

    let forward_task = tokio::spawn(async move {
        while let Some(envelope) = mailbox.recv().await {
            if send_envelope(&mut sender, &envelope).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::SubscribeLobby { lobby_id }) => {
                    state.hub.subscribe_lobby(client_id, lobby_id).await;
                    debug!(%client_id, %lobby_id, "client subscribed to lobby room");
                }
                Err(err) => debug!(%client_id, %err, "ignoring unparseable client message"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.hub.unregister(client_id).await;
    forward_task.abort();
    info!(%client_id, "websocket connection terminated");
}

async fn send_envelope(
    sender: &mut futures_util::stream::SplitSink<axum::extract::ws::WebSocket, Message>,
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());
    sender.send(Message::Text(text.into())).await
}
