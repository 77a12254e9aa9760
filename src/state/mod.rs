mod room;
mod round;
mod score;
mod submission;

use crate::referee::ValidationGateway;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub use room::{normalize_name, normalize_room_code, unique_room_code, Room};
pub use round::{GradingJob, GradingTrigger};
pub use score::{score_round, standings, PlayerRoundScore};

/// A live room; every state change for it happens under this mutex
pub type SharedRoom = Arc<Mutex<Room>>;

/// Errors surfaced to the client that sent the request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    #[error("Room is full")]
    Full,

    #[error("Game has already started")]
    AlreadyStarted,

    #[error("You are not in this room")]
    NotMember,

    #[error("Only the host can do that")]
    NotHost,

    #[error("Please enter a name")]
    InvalidName,
}

impl RoomError {
    /// Stable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::NotFound => "ROOM_NOT_FOUND",
            RoomError::Full => "ROOM_FULL",
            RoomError::AlreadyStarted => "ALREADY_STARTED",
            RoomError::NotMember => "NOT_MEMBER",
            RoomError::NotHost => "NOT_HOST",
            RoomError::InvalidName => "INVALID_NAME",
        }
    }
}

/// Shared application state: the room registry plus the services rooms use
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomId, SharedRoom>>>,
    pub referee: Arc<ValidationGateway>,
    pub settings: GameSettings,
}

impl AppState {
    pub fn new(referee: ValidationGateway, settings: GameSettings) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            referee: Arc::new(referee),
            settings,
        }
    }

    /// Number of live rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ValidationGateway::offline(), GameSettings::default())
    }
}
