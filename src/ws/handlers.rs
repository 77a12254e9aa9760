//! WebSocket message dispatch
//!
//! Every inbound event is handled here against the connection's [`Session`].
//! Replies meant only for the sender are returned; room-wide events go out
//! through the room's broadcast channel instead.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{normalize_room_code, AppState, RoomError};
use crate::types::*;
use std::sync::Arc;

use super::Session;

impl From<RoomError> for ServerMessage {
    fn from(e: RoomError) -> Self {
        ServerMessage::error(e.code(), e.to_string())
    }
}

/// Handle a client message and return the replies for the sender
pub async fn handle_message(
    mut msg: ClientMessage,
    session: &mut Session,
    state: &Arc<AppState>,
) -> Vec<ServerMessage> {
    if let Some(room_id) = msg.room_id_mut() {
        *room_id = normalize_room_code(room_id.as_str());
    }

    match msg {
        ClientMessage::CreateRoom { name, avatar } => {
            handle_create_room(state, session, name, avatar).await
        }

        ClientMessage::JoinRoom {
            room_id,
            name,
            avatar,
        } => handle_join_room(state, session, room_id, name, avatar).await,

        ClientMessage::CheckRoomState { room_id } => {
            let Some(room) = state.get_room(&room_id).await else {
                return vec![RoomError::NotFound.into()];
            };
            let room = room.lock().await;
            let mut replies = vec![ServerMessage::UpdateLobby {
                players: room.player_views(),
            }];
            if room.phase == RoomPhase::Playing {
                replies.extend(room.round_start_message());
            }
            replies
        }

        ClientMessage::ForceStartGame { room_id, rounds } => {
            match state.force_start(&room_id, &session.player_id, rounds).await {
                Ok(()) => vec![],
                Err(e) => {
                    tracing::warn!("Force start rejected for {}: {}", session.player_id, e);
                    vec![e.into()]
                }
            }
        }

        ClientMessage::GetGameData { room_id } => match state.get_snapshot(&room_id).await {
            // Only a running game has round data to sync
            Some(snapshot)
                if matches!(snapshot.phase, RoomPhase::Playing | RoomPhase::Grading) =>
            {
                vec![ServerMessage::SyncGameData {
                    round: snapshot.round,
                    letter: snapshot.letter,
                    total_rounds: snapshot.total_rounds,
                    players: snapshot.players,
                }]
            }
            Some(_) => vec![],
            None => vec![RoomError::NotFound.into()],
        },

        ClientMessage::SubmitInput {
            room_id,
            round,
            category,
            value,
        } => {
            match state
                .set_input(&room_id, &session.player_id, round, category, &value)
                .await
            {
                Ok(_) => vec![],
                Err(e) => vec![e.into()],
            }
        }

        ClientMessage::PlayerFinishedRound { room_id } => {
            match state.finish_round(&room_id, &session.player_id).await {
                Ok(()) => vec![],
                Err(e) => vec![e.into()],
            }
        }
    }
}

async fn handle_create_room(
    state: &Arc<AppState>,
    session: &mut Session,
    name: String,
    avatar: Option<String>,
) -> Vec<ServerMessage> {
    leave_current_room(state, session).await;

    match state
        .create_room(&session.player_id, &name, avatar.as_deref())
        .await
    {
        Ok((room_id, rx)) => {
            session.enter(room_id.clone(), rx);
            vec![ServerMessage::RoomCreated {
                room_id,
                player_id: session.player_id.clone(),
            }]
        }
        Err(e) => vec![e.into()],
    }
}

async fn handle_join_room(
    state: &Arc<AppState>,
    session: &mut Session,
    room_id: RoomId,
    name: String,
    avatar: Option<String>,
) -> Vec<ServerMessage> {
    if session.room_id.as_deref() != Some(room_id.as_str()) {
        leave_current_room(state, session).await;
    }

    match state
        .join_room(&room_id, &session.player_id, &name, avatar.as_deref())
        .await
    {
        Ok(rx) => {
            session.enter(room_id.clone(), rx);
            vec![ServerMessage::RoomJoined {
                room_id,
                player_id: session.player_id.clone(),
            }]
        }
        Err(e) => {
            tracing::info!("Join of room {} refused: {}", room_id, e);
            vec![e.into()]
        }
    }
}

/// Give up the seat this connection holds, if any
pub async fn leave_current_room(state: &Arc<AppState>, session: &mut Session) {
    if let Some(room_id) = session.leave() {
        state.leave_room(&room_id, &session.player_id).await;
    }
}
