use super::{AppState, RoomError};
use crate::types::*;

impl AppState {
    /// Overwrite one draft answer for the active round.
    ///
    /// Content is not checked here. Returns `Ok(false)` when the write was
    /// dropped because the round is frozen, over, or not the one the client
    /// was typing into.
    pub async fn set_input(
        &self,
        room_id: &str,
        player_id: &str,
        round: u32,
        category: Category,
        value: &str,
    ) -> Result<bool, RoomError> {
        let room = self.get_room(room_id).await.ok_or(RoomError::NotFound)?;
        let mut room = room.lock().await;

        if room.player(player_id).is_none() {
            return Err(RoomError::NotMember);
        }
        if room.phase != RoomPhase::Playing || room.grading || room.round != round {
            tracing::debug!(
                "Dropping late input from {} for room {} round {} (now round {}, {:?})",
                player_id,
                room_id,
                round,
                room.round,
                room.phase
            );
            return Ok(false);
        }

        let Some(player) = room.player_mut(player_id) else {
            return Err(RoomError::NotMember);
        };
        player.current_input.insert(category, value.to_string());
        Ok(true)
    }
}
