use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PORT: u16 = 3030;

/// Globally-unique entity identifier, carried on the wire as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// One sampled directional input. `sequence_id` is assigned by the producing
/// peer, strictly increasing, and is the unit of acknowledgment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Input {
    #[serde(rename = "id")]
    pub sequence_id: u64,
    #[serde(rename = "dt")]
    pub delta_time: f64,
    #[serde(rename = "leftArrowPressed")]
    pub left: bool,
    #[serde(rename = "rightArrowPressed")]
    pub right: bool,
    #[serde(rename = "upArrowPressed")]
    pub up: bool,
    #[serde(rename = "downArrowPressed")]
    pub down: bool,
}

/// One entity's pose at a single authoritative tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    #[serde(rename = "id")]
    pub entity_id: EntityId,
    #[serde(rename = "posX")]
    pub x: f64,
    #[serde(rename = "posY")]
    pub y: f64,
    #[serde(rename = "rot")]
    pub heading: f64,
}

/// Complete world state at one host tick. `last_applied_input` is
/// personalized per receiver before sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(rename = "lastInput")]
    pub last_applied_input: u64,
    #[serde(rename = "serverTime")]
    pub host_time: f64,
    #[serde(rename = "players")]
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    pub fn new(host_time: f64) -> Self {
        Self {
            last_applied_input: 0,
            host_time,
            entities: Vec::new(),
        }
    }

    pub fn entity(&self, id: &EntityId) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| &e.entity_id == id)
    }
}

/// The `player` block of an `init` message: the freshly spawned entity that
/// the receiving peer will control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInit {
    #[serde(rename = "id")]
    pub entity_id: EntityId,
    #[serde(rename = "z")]
    pub depth: f64,
    #[serde(rename = "posX")]
    pub x: f64,
    #[serde(rename = "posY")]
    pub y: f64,
    #[serde(rename = "rot")]
    pub heading: f64,
}

/// Every message kind on the wire. The `id` field of the JSON object selects
/// the variant; unknown kinds fail to decode and are dropped by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "lowercase")]
pub enum Message {
    Handshake {
        timestamp: f64,
    },
    Init {
        timestamp: f64,
        snapshot: WorldSnapshot,
        player: PlayerInit,
    },
    Snapshot {
        snapshot: WorldSnapshot,
    },
    #[serde(rename = "input")]
    Inputs {
        inputs: Vec<Input>,
    },
    Ping {
        timestamp: f64,
    },
    Pong {
        timestamp: f64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}

pub fn encode_message(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(message).map_err(ProtocolError::Encode)
}

pub fn decode_message(payload: &[u8]) -> Result<Message, ProtocolError> {
    serde_json::from_slice(payload).map_err(ProtocolError::Decode)
}
