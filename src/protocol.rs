use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        name: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    JoinRoom {
        room_id: RoomId,
        name: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    /// Lobby refresh / late page load
    CheckRoomState {
        room_id: RoomId,
    },
    /// Host starts before the room is full, optionally choosing the number of rounds
    ForceStartGame {
        room_id: RoomId,
        #[serde(default)]
        rounds: Option<i64>,
    },
    /// Game page asks for the current round after navigation
    GetGameData {
        room_id: RoomId,
    },
    /// One keystroke-level update of a single answer field
    SubmitInput {
        room_id: RoomId,
        round: u32,
        category: Category,
        value: String,
    },
    /// "I'm done" - ends the round for everyone
    PlayerFinishedRound {
        room_id: RoomId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomCreated {
        room_id: RoomId,
        player_id: PlayerId,
    },
    RoomJoined {
        room_id: RoomId,
        player_id: PlayerId,
    },
    ErrorMessage {
        code: String,
        msg: String,
    },
    UpdateLobby {
        players: Vec<PlayerView>,
    },
    RoundStart {
        round: u32,
        letter: char,
        total_rounds: u32,
        /// RFC 3339 timestamp at which the round times out
        deadline: Option<String>,
        server_now: String,
    },
    SyncGameData {
        round: u32,
        letter: Option<char>,
        total_rounds: u32,
        players: Vec<PlayerView>,
    },
    /// Someone finished; clients should lock their inputs
    FreezeGame,
    RoundEnd {
        round: u32,
        results: BTreeMap<PlayerId, RoundResult>,
        players: Vec<PlayerView>,
        /// Which arbiter produced the verdicts
        validator: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        notice: Option<String>,
    },
    GameOver {
        /// Final standings, best first
        players: Vec<PlayerView>,
    },
}

impl ClientMessage {
    /// The room this message is addressed to, if any
    pub fn room_id_mut(&mut self) -> Option<&mut RoomId> {
        match self {
            ClientMessage::CreateRoom { .. } => None,
            ClientMessage::JoinRoom { room_id, .. }
            | ClientMessage::CheckRoomState { room_id }
            | ClientMessage::ForceStartGame { room_id, .. }
            | ClientMessage::GetGameData { room_id }
            | ClientMessage::SubmitInput { room_id, .. }
            | ClientMessage::PlayerFinishedRound { room_id } => Some(room_id),
        }
    }
}

impl ServerMessage {
    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        ServerMessage::ErrorMessage {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}
