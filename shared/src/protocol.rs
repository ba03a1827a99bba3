//! Messages exchanged between the client and the remote authority.

use crate::snapshot::Snapshot;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single encoded message.
pub const MAX_DATAGRAM: usize = 8192;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GameFamily {
    /// Two paddles, one ball.
    Pong,
    /// Three paddles on a circular arena.
    Tri,
    /// Lane-based tower defense.
    Tower,
}

impl GameFamily {
    pub const ALL: [GameFamily; 3] = [GameFamily::Pong, GameFamily::Tri, GameFamily::Tower];

    pub fn name(&self) -> &'static str {
        match self {
            GameFamily::Pong => "pong",
            GameFamily::Tri => "tri",
            GameFamily::Tower => "tower",
        }
    }

    /// Number of subjects (players or towers) a snapshot of this family carries.
    pub fn subjects(&self) -> usize {
        match self {
            GameFamily::Tri => crate::TRI_PLAYERS,
            GameFamily::Pong | GameFamily::Tower => 2,
        }
    }
}

impl fmt::Display for GameFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the authority placed this client: a side for the two-sided games,
/// an index around the circle for the tri variant.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seat {
    Left,
    Right,
    Index(u8),
}

impl Seat {
    pub fn index(&self) -> usize {
        match self {
            Seat::Left => 0,
            Seat::Right => 1,
            Seat::Index(i) => *i as usize,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub user_id: Option<u64>,
}

impl Identity {
    pub fn guest(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            user_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TroopType {
    Soldier,
    Archer,
    Tank,
}

impl TroopType {
    pub const ALL: [TroopType; 3] = [TroopType::Soldier, TroopType::Archer, TroopType::Tank];
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum TowerCommand {
    Spawn { troop_type: TroopType },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ClientMessage {
    Connect {
        family: GameFamily,
        client_version: u32,
    },
    JoinQueue {
        identity: Identity,
    },
    JoinTriQueue {
        identity: Identity,
    },
    StartSolo {
        identity: Identity,
    },
    CancelQueue,
    MovePaddle {
        seat: Seat,
        direction: Option<Direction>,
    },
    Ready {
        room_id: RoomId,
    },
    QuitMatch {
        room_id: RoomId,
        username: String,
    },
    Command(TowerCommand),
    Disconnect,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerMessage {
    Connected {
        client_id: u32,
    },
    /// Acknowledges a queue join and names the room the client now waits on.
    Queued {
        room_id: RoomId,
    },
    MatchFound {
        room_id: RoomId,
        seat: Seat,
        opponent: Option<String>,
    },
    StateUpdate {
        snapshot: Snapshot,
    },
    BallExplode {
        x: f32,
        y: f32,
    },
    Error {
        message: String,
    },
    OpponentLeft,
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Connected,
    Queued,
    MatchFound,
    StateUpdate,
    BallExplode,
    Error,
    OpponentLeft,
    Disconnected,
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::Connected { .. } => MessageKind::Connected,
            ServerMessage::Queued { .. } => MessageKind::Queued,
            ServerMessage::MatchFound { .. } => MessageKind::MatchFound,
            ServerMessage::StateUpdate { .. } => MessageKind::StateUpdate,
            ServerMessage::BallExplode { .. } => MessageKind::BallExplode,
            ServerMessage::Error { .. } => MessageKind::Error,
            ServerMessage::OpponentLeft => MessageKind::OpponentLeft,
            ServerMessage::Disconnected { .. } => MessageKind::Disconnected,
        }
    }
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(message)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_index() {
        assert_eq!(Seat::Left.index(), 0);
        assert_eq!(Seat::Right.index(), 1);
        assert_eq!(Seat::Index(2).index(), 2);
    }

    #[test]
    fn test_family_subjects() {
        assert_eq!(GameFamily::Pong.subjects(), 2);
        assert_eq!(GameFamily::Tri.subjects(), 3);
        assert_eq!(GameFamily::Tower.subjects(), 2);
    }

    #[test]
    fn test_move_paddle_serialization() {
        let message = ClientMessage::MovePaddle {
            seat: Seat::Index(1),
            direction: None,
        };

        let bytes = encode(&message).unwrap();
        let decoded: ClientMessage = decode(&bytes).unwrap();

        match decoded {
            ClientMessage::MovePaddle { seat, direction } => {
                assert_eq!(seat, Seat::Index(1));
                assert!(direction.is_none());
            }
            _ => panic!("Wrong message type after deserialization"),
        }
    }

    #[test]
    fn test_match_found_serialization() {
        let message = ServerMessage::MatchFound {
            room_id: RoomId::from("R7"),
            seat: Seat::Right,
            opponent: Some("ada".to_string()),
        };

        let bytes = encode(&message).unwrap();
        assert!(bytes.len() < MAX_DATAGRAM);
        let decoded: ServerMessage = decode(&bytes).unwrap();

        assert_eq!(decoded.kind(), MessageKind::MatchFound);
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let garbage = [0xffu8, 0xff, 0xff, 0xff, 0x01];
        assert!(decode::<ServerMessage>(&garbage).is_err());
    }
}
