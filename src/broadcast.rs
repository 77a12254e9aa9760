use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// How often ended rooms are checked for expiry
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn a background task that tears down rooms which ended more than the configured TTL ago
pub fn spawn_room_reaper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(REAP_INTERVAL).await;

            let removed = state.reap_ended_rooms().await;
            if removed > 0 {
                tracing::info!(
                    "Reaped {} ended rooms, {} still live",
                    removed,
                    state.room_count().await
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameSettings;

    #[tokio::test(start_paused = true)]
    async fn test_reaper_removes_only_expired_ended_rooms() {
        let settings = GameSettings {
            ended_room_ttl: Duration::from_secs(60),
            ..GameSettings::default()
        };
        let state = Arc::new(AppState::new(
            crate::referee::ValidationGateway::offline(),
            settings,
        ));

        let (ended, _rx1) = state
            .create_room(&"p1".to_string(), "Isha", None)
            .await
            .unwrap();
        let (lobby, _rx2) = state
            .create_room(&"p2".to_string(), "Ishant", None)
            .await
            .unwrap();
        {
            let room = state.get_room(&ended).await.unwrap();
            let mut room = room.lock().await;
            room.phase = crate::types::RoomPhase::Ended;
            room.ended_at = Some(tokio::time::Instant::now());
        }

        let reaper = spawn_room_reaper(state.clone());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(state.room_count().await, 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(state.get_room(&ended).await.is_none());
        assert!(state.get_room(&lobby).await.is_some());

        reaper.abort();
    }
}
