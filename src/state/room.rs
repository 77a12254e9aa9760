use super::{AppState, RoomError, SharedRoom};
use crate::letters::LetterPool;
use crate::protocol::ServerMessage;
use crate::types::*;
use rand::Rng;
use std::sync::Arc;
use tokio::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tokio::task::AbortHandle;

/// Room codes avoid look-alike characters (0/O, 1/I/L)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

/// Per-room broadcast buffer
const ROOM_CHANNEL_CAPACITY: usize = 64;

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Draw codes until one is not taken
pub fn unique_room_code(
    is_taken: impl Fn(&str) -> bool,
    mut generate: impl FnMut() -> String,
) -> String {
    loop {
        let code = generate();
        if !is_taken(&code) {
            return code;
        }
        tracing::debug!("Room code collision on {}, re-rolling", code);
    }
}

/// Trim and bound a display name
pub fn normalize_name(raw: &str) -> Result<String, RoomError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RoomError::InvalidName);
    }
    Ok(trimmed.chars().take(MAX_NAME_CHARS).collect())
}

/// Room codes are matched case-insensitively and without surrounding whitespace
pub fn normalize_room_code(raw: &str) -> RoomId {
    raw.trim().to_uppercase()
}

/// One game session. Only touched while holding its [`SharedRoom`] lock.
pub struct Room {
    pub id: RoomId,
    pub phase: RoomPhase,
    /// Seating order; the first player is the host
    pub players: Vec<Player>,
    pub total_rounds: u32,
    /// 1-based once the game starts
    pub round: u32,
    pub letter: Option<char>,
    pub letters: LetterPool,
    pub round_deadline: Option<chrono::DateTime<chrono::Utc>>,
    /// Set once grading for the current round has begun
    pub(super) grading: bool,
    pub(super) round_timer: Option<AbortHandle>,
    /// Set once the room is going away; nobody may take a seat after this
    pub(super) closed: bool,
    pub ended_at: Option<Instant>,
    events: broadcast::Sender<ServerMessage>,
}

impl Room {
    pub fn new(id: RoomId, host: Player, total_rounds: u32) -> Self {
        let (events, _rx) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            id,
            phase: RoomPhase::Lobby,
            players: vec![host],
            total_rounds,
            round: 0,
            letter: None,
            letters: LetterPool::new(),
            round_deadline: None,
            grading: false,
            round_timer: None,
            closed: false,
            ended_at: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }

    /// Send to every subscribed member; nobody listening is fine
    pub fn broadcast(&self, msg: ServerMessage) {
        let _ = self.events.send(msg);
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.players.first().is_some_and(|p| p.id == player_id)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players.iter().map(Player::view).collect()
    }

    /// Copy every player's current draft answers
    pub fn freeze_inputs(&self) -> FrozenInputs {
        self.players
            .iter()
            .map(|p| (p.id.clone(), p.current_input.clone()))
            .collect()
    }

    pub fn clear_inputs(&mut self) {
        for player in &mut self.players {
            player.current_input.clear();
        }
    }

    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.round_timer.take() {
            timer.abort();
        }
    }

    /// Drop or disconnect a player. Returns true, and closes the room, when
    /// nobody connected is left.
    pub(super) fn release_seat(&mut self, player_id: &str) -> bool {
        if self.phase == RoomPhase::Lobby {
            self.players.retain(|p| p.id != player_id);
            if !self.players.is_empty() {
                self.broadcast(ServerMessage::UpdateLobby {
                    players: self.player_views(),
                });
            }
        } else if let Some(player) = self.player_mut(player_id) {
            player.connected = false;
        }

        if self.players.iter().any(|p| p.connected) {
            return false;
        }
        self.closed = true;
        self.cancel_timer();
        true
    }

    pub fn round_start_message(&self) -> Option<ServerMessage> {
        Some(ServerMessage::RoundStart {
            round: self.round,
            letter: self.letter?,
            total_rounds: self.total_rounds,
            deadline: self.round_deadline.map(|d| d.to_rfc3339()),
            server_now: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn snapshot(&self, round_seconds: u64) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            phase: self.phase,
            players: self.player_views(),
            round: self.round,
            total_rounds: self.total_rounds,
            letter: self.letter,
            round_seconds,
        }
    }
}

impl AppState {
    /// Look up a live room
    pub async fn get_room(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Open a new room with the caller as host
    pub async fn create_room(
        &self,
        player_id: &PlayerId,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<(RoomId, broadcast::Receiver<ServerMessage>), RoomError> {
        let name = normalize_name(name)?;
        let host = Player::new(player_id.clone(), name, Avatar::from_tag(avatar));

        let mut rooms = self.rooms.write().await;
        let code = unique_room_code(|code| rooms.contains_key(code), generate_room_code);

        let room = Room::new(code.clone(), host, self.settings.default_rounds);
        let rx = room.subscribe();
        rooms.insert(code.clone(), Arc::new(Mutex::new(room)));

        tracing::info!("Room {} created by {}", code, player_id);
        Ok((code, rx))
    }

    /// Take a seat in a lobby. The fourth player starts the game.
    pub async fn join_room(
        self: &Arc<Self>,
        room_id: &str,
        player_id: &PlayerId,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<broadcast::Receiver<ServerMessage>, RoomError> {
        let name = normalize_name(name)?;
        let room = self.get_room(room_id).await.ok_or(RoomError::NotFound)?;
        let mut room = room.lock().await;

        if room.closed {
            return Err(RoomError::NotFound);
        }
        if room.player(player_id).is_some() {
            return Ok(room.subscribe());
        }
        if room.is_full() {
            return Err(RoomError::Full);
        }
        if room.phase != RoomPhase::Lobby {
            return Err(RoomError::AlreadyStarted);
        }

        room.players
            .push(Player::new(player_id.clone(), name, Avatar::from_tag(avatar)));
        let rx = room.subscribe();
        room.broadcast(ServerMessage::UpdateLobby {
            players: room.player_views(),
        });
        tracing::info!(
            "Player {} joined room {} ({}/{})",
            player_id,
            room.id,
            room.players.len(),
            MAX_PLAYERS
        );

        if room.is_full() {
            let total_rounds = self.settings.default_rounds;
            self.start_game_locked(&mut room, total_rounds);
        }

        Ok(rx)
    }

    pub async fn get_snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        let room = self.get_room(room_id).await?;
        let room = room.lock().await;
        Some(room.snapshot(self.settings.round_time.as_secs()))
    }

    /// Drop a room from the registry, cancelling any pending timer
    pub async fn remove_room(&self, room_id: &str) -> bool {
        let removed = self.rooms.write().await.remove(room_id);
        match removed {
            Some(room) => {
                let mut room = room.lock().await;
                room.closed = true;
                room.cancel_timer();
                tracing::info!("Room {} torn down", room_id);
                true
            }
            None => false,
        }
    }

    /// A connection went away.
    ///
    /// In the lobby the seat is freed; once the game is running the player stays
    /// on the roster with their score. A room with nobody connected is torn down.
    pub async fn leave_room(&self, room_id: &str, player_id: &str) {
        let Some(room) = self.get_room(room_id).await else {
            return;
        };

        // Closed under the room lock; joins from here on get NotFound
        let abandoned = room.lock().await.release_seat(player_id);

        tracing::info!("Player {} left room {}", player_id, room_id);
        if abandoned {
            self.remove_room(room_id).await;
        }
    }

    /// Remove rooms that finished longer ago than the configured TTL
    pub async fn reap_ended_rooms(&self) -> usize {
        let rooms: Vec<(RoomId, SharedRoom)> = self
            .rooms
            .read()
            .await
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect();

        let mut expired = Vec::new();
        for (id, room) in rooms {
            let room = room.lock().await;
            if room
                .ended_at
                .is_some_and(|at| at.elapsed() >= self.settings.ended_room_ttl)
            {
                expired.push(id);
            }
        }

        let mut removed = 0;
        for id in expired {
            if self.remove_room(&id).await {
                removed += 1;
            }
        }
        removed
    }
}
