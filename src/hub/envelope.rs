//! Wire envelope for the fan-out hub (spec §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LobbyUpdate,
    PlayerJoined,
    PlayerLeft,
    ReadyStatusChanged,
    PrizePoolUpdate,
    MatchStarting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lobby_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<Uuid>,
    pub payload: Value,
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(event_type: EventType, lobby_id: Option<Uuid>, pool_id: Option<Uuid>, payload: Value, timestamp: i64) -> Self {
        Envelope {
            event_type,
            lobby_id,
            pool_id,
            payload,
            timestamp,
        }
    }
}

/// Client-to-server subscription request: `{"type":"subscribe_lobby","lobby_id":"<uuid>"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeLobby { lobby_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_ids_when_serialized() {
        let envelope = Envelope::new(EventType::MatchStarting, Some(Uuid::new_v4()), None, serde_json::json!({}), 0);
        let encoded = serde_json::to_value(&envelope).unwrap();
        assert!(encoded.get("pool_id").is_none());
        assert!(encoded.get("lobby_id").is_some());
    }

    #[test]
    fn subscribe_lobby_parses_from_wire_format() {
        let lobby_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"subscribe_lobby","lobby_id":"{lobby_id}"}}"#);
        let parsed: ClientMessage = serde_json::from_str(&raw).unwrap();
        match parsed {
            ClientMessage::SubscribeLobby { lobby_id: parsed_id } => assert_eq!(parsed_id, lobby_id),
        }
    }
}
