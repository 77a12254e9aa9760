pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{PlayerId, RoomId};

/// What one connection knows about itself
pub struct Session {
    /// Ephemeral player id, fixed for the lifetime of the connection
    pub player_id: PlayerId,
    pub room_id: Option<RoomId>,
    room_rx: Option<broadcast::Receiver<ServerMessage>>,
}

impl Session {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            room_id: None,
            room_rx: None,
        }
    }

    /// Start following a room's broadcasts
    pub fn enter(&mut self, room_id: RoomId, rx: broadcast::Receiver<ServerMessage>) {
        self.room_id = Some(room_id);
        self.room_rx = Some(rx);
    }

    /// Stop following the current room, returning its id
    pub fn leave(&mut self) -> Option<RoomId> {
        self.room_rx = None;
        self.room_id.take()
    }

    /// Room broadcasts already queued for this connection
    pub fn pending_room_events(&mut self) -> Vec<ServerMessage> {
        let mut events = Vec::new();
        if let Some(rx) = self.room_rx.as_mut() {
            while let Ok(msg) = rx.try_recv() {
                events.push(msg);
            }
        }
        events
    }

    /// Next room broadcast; never resolves while the connection is not in a room
    pub async fn next_room_event(&mut self) -> Option<ServerMessage> {
        let Some(rx) = self.room_rx.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            match rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Connection {} lagged, skipped {} room events",
                        self.player_id,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.room_rx = None;
                    return None;
                }
            }
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            Ok(())
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session::new(ulid::Ulid::new().to_string());

    tracing::info!("WebSocket connected: {}", session.player_id);

    loop {
        tokio::select! {
            room_msg = session.next_room_event() => {
                if let Some(msg) = room_msg {
                    if send_json(&mut sender, &msg).await.is_err() {
                        break;
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message from {}: {}", session.player_id, text);

                        let replies = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &mut session, &state).await
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                vec![ServerMessage::error(
                                    "PARSE_ERROR",
                                    format!("Invalid message format: {}", e),
                                )]
                            }
                        };

                        let mut failed = false;
                        for reply in &replies {
                            if send_json(&mut sender, reply).await.is_err() {
                                tracing::error!("Failed to send response");
                                failed = true;
                                break;
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    handlers::leave_current_room(&state, &mut session).await;
    tracing::info!("WebSocket connection closed: {}", session.player_id);
}
