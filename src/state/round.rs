//! Round controller.
//!
//! `lobby -> playing(1) -> grading -> playing(2) -> ... -> ended`
//!
//! A round leaves `playing` exactly once, either through its timer or the first
//! "I'm done". Both paths go through [`AppState::begin_grading`], which flips the
//! room's `grading` flag under the room lock; whichever arrives second sees the
//! flag (or a stale round number) and does nothing.

use super::room::Room;
use super::score::{score_round, standings};
use super::{AppState, RoomError};
use crate::protocol::ServerMessage;
use crate::types::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;

const REFEREE_HICCUP: &str = "The referee had a hiccup! Moving to next round...";
const DEGRADED_NOTICE: &str = "The main referee was unavailable, a backup graded this round.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingTrigger {
    Timer,
    EarlyFinish,
}

/// A frozen round waiting to be graded
#[derive(Debug, Clone)]
pub struct GradingJob {
    pub room_id: RoomId,
    pub round: u32,
    pub letter: char,
    pub inputs: FrozenInputs,
}

impl AppState {
    /// Host starts the game before the room is full
    pub async fn force_start(
        self: &Arc<Self>,
        room_id: &str,
        player_id: &str,
        rounds: Option<i64>,
    ) -> Result<(), RoomError> {
        let room = self.get_room(room_id).await.ok_or(RoomError::NotFound)?;
        let mut room = room.lock().await;

        if room.player(player_id).is_none() {
            return Err(RoomError::NotMember);
        }
        if room.phase != RoomPhase::Lobby {
            return Err(RoomError::AlreadyStarted);
        }
        if !room.is_host(player_id) {
            return Err(RoomError::NotHost);
        }

        let total_rounds = self.settings.resolve_rounds(rounds);
        self.start_game_locked(&mut room, total_rounds);
        Ok(())
    }

    pub(super) fn start_game_locked(self: &Arc<Self>, room: &mut Room, total_rounds: u32) {
        tracing::info!(
            "Starting game in room {} with {} players, {} rounds",
            room.id,
            room.players.len(),
            total_rounds
        );
        room.total_rounds = total_rounds;
        room.round = 1;
        self.start_round_locked(room);
    }

    /// Enter `playing` for `room.round`: new letter, empty drafts, fresh timer
    fn start_round_locked(self: &Arc<Self>, room: &mut Room) {
        let letter = room.letters.draw(&mut rand::rng());
        room.phase = RoomPhase::Playing;
        room.letter = Some(letter);
        room.grading = false;
        room.clear_inputs();

        let round_time = self.settings.round_time;
        room.round_deadline = chrono::Duration::from_std(round_time)
            .ok()
            .map(|d| chrono::Utc::now() + d);

        room.cancel_timer();
        let state = Arc::clone(self);
        let room_id = room.id.clone();
        let round = room.round;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(round_time).await;
            tracing::info!("Round {} timed out in room {}", round, room_id);
            if let Some(job) = state
                .begin_grading(&room_id, round, GradingTrigger::Timer)
                .await
            {
                state.run_grading(job).await;
            }
        });
        room.round_timer = Some(timer.abort_handle());

        tracing::info!(
            "Room {} round {}/{} letter {}",
            room.id,
            room.round,
            room.total_rounds,
            letter
        );
        if let Some(msg) = room.round_start_message() {
            room.broadcast(msg);
        }
    }

    /// A player pressed "I'm done": freeze everyone and grade now
    pub async fn finish_round(self: &Arc<Self>, room_id: &str, player_id: &str) -> Result<(), RoomError> {
        let round = {
            let room = self.get_room(room_id).await.ok_or(RoomError::NotFound)?;
            let room = room.lock().await;
            if room.player(player_id).is_none() {
                return Err(RoomError::NotMember);
            }
            room.round
        };

        if let Some(job) = self
            .begin_grading(room_id, round, GradingTrigger::EarlyFinish)
            .await
        {
            tracing::info!("Player {} finished round {} in room {}", player_id, round, room_id);
            tokio::spawn(Arc::clone(self).run_grading(job));
        }
        Ok(())
    }

    /// Move a round from `playing` to `grading`, at most once per round
    pub async fn begin_grading(
        &self,
        room_id: &str,
        round: u32,
        trigger: GradingTrigger,
    ) -> Option<GradingJob> {
        let room = self.get_room(room_id).await?;
        let mut room = room.lock().await;

        let letter = room.letter?;
        if room.phase != RoomPhase::Playing || room.round != round || room.grading {
            tracing::debug!(
                "Ignoring {:?} for room {} round {}: round already closed",
                trigger,
                room_id,
                round
            );
            return None;
        }

        room.grading = true;
        room.phase = RoomPhase::Grading;
        match trigger {
            GradingTrigger::EarlyFinish => {
                room.cancel_timer();
                room.broadcast(ServerMessage::FreezeGame);
            }
            // The timer task is the caller; just forget its handle
            GradingTrigger::Timer => {
                room.round_timer = None;
            }
        }

        Some(GradingJob {
            room_id: room.id.clone(),
            round,
            letter,
            inputs: room.freeze_inputs(),
        })
    }

    /// Validate, score, publish, wait out the settle delay, then advance.
    ///
    /// Validation and scoring run in their own task so that a panic in either
    /// still ends in a published (empty) result and the next round.
    pub async fn run_grading(self: Arc<Self>, job: GradingJob) {
        let referee = Arc::clone(&self.referee);
        let inputs = job.inputs.clone();
        let letter = job.letter;
        let graded = tokio::spawn(async move {
            let outcome = referee.validate(&inputs, letter).await;
            let scores = score_round(&inputs, &outcome.mask);
            (outcome, scores)
        })
        .await;

        let Some(room) = self.get_room(&job.room_id).await else {
            tracing::debug!("Room {} disappeared during grading", job.room_id);
            return;
        };

        {
            let mut room = room.lock().await;
            room.clear_inputs();

            match graded {
                Ok((outcome, scores)) => {
                    let mut results = BTreeMap::new();
                    for player in room.players.iter_mut() {
                        let Some(scored) = scores.get(&player.id) else {
                            continue;
                        };
                        player.score += scored.round_score;
                        results.insert(
                            player.id.clone(),
                            RoundResult {
                                round_score: scored.round_score,
                                total_score: player.score,
                                breakdown: scored.breakdown.clone(),
                                validation: scored.validation.clone(),
                            },
                        );
                    }

                    let notice = outcome.degraded.then(|| DEGRADED_NOTICE.to_string());
                    room.broadcast(ServerMessage::RoundEnd {
                        round: job.round,
                        results,
                        players: room.player_views(),
                        validator: outcome.validator,
                        notice,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        "Grading failed for room {} round {}: {}",
                        job.room_id,
                        job.round,
                        e
                    );
                    room.broadcast(ServerMessage::error("REFEREE_FAILED", REFEREE_HICCUP));
                    room.broadcast(ServerMessage::RoundEnd {
                        round: job.round,
                        results: BTreeMap::new(),
                        players: room.player_views(),
                        validator: "none".to_string(),
                        notice: Some(REFEREE_HICCUP.to_string()),
                    });
                }
            }
        }

        tokio::time::sleep(self.settings.settle_delay).await;
        self.advance(&job.room_id, job.round).await;
    }

    /// After the settle delay: next round, or game over
    async fn advance(self: &Arc<Self>, room_id: &str, graded_round: u32) {
        let Some(room) = self.get_room(room_id).await else {
            return;
        };
        let mut room = room.lock().await;

        if room.phase != RoomPhase::Grading || room.round != graded_round {
            return;
        }

        if room.round < room.total_rounds {
            room.round += 1;
            self.start_round_locked(&mut room);
        } else {
            room.phase = RoomPhase::Ended;
            room.ended_at = Some(Instant::now());
            room.round_deadline = None;
            tracing::info!("Game over in room {}", room.id);
            room.broadcast(ServerMessage::GameOver {
                players: standings(&room.players),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::broadcast;

    async fn two_player_room(
        state: &Arc<AppState>,
        rounds: i64,
    ) -> (RoomId, broadcast::Receiver<ServerMessage>) {
        let (code, rx) = state
            .create_room(&"p1".to_string(), "Isha", None)
            .await
            .unwrap();
        state
            .join_room(&code, &"p2".to_string(), "Ishant", None)
            .await
            .unwrap();
        state.force_start(&code, "p1", Some(rounds)).await.unwrap();
        (code, rx)
    }

    async fn current_letter(state: &AppState, code: &str) -> char {
        state.get_snapshot(code).await.unwrap().letter.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_finish_grades_once() {
        let arbiter = Arc::new(CountingArbiter {
            calls: AtomicUsize::new(0),
        });
        let state = state_with(arbiter.clone());
        let (code, mut rx) = two_player_room(&state, 2).await;
        drain(&mut rx);

        state.finish_round(&code, "p1").await.unwrap();
        state.finish_round(&code, "p2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(arbiter.calls.load(Ordering::SeqCst), 1);
        let messages = drain(&mut rx);
        assert_eq!(
            messages
                .iter()
                .filter(|m| matches!(m, ServerMessage::FreezeGame))
                .count(),
            1
        );
        assert_eq!(
            messages
                .iter()
                .filter(|m| matches!(m, ServerMessage::RoundEnd { .. }))
                .count(),
            1
        );

        // The cancelled round timer must not grade round 1 again
        tokio::time::sleep(Duration::from_secs(200)).await;
        let snapshot = state.get_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.phase, RoomPhase::Ended);
        assert_eq!(arbiter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_expiry_grades_and_advances() {
        let arbiter = Arc::new(CountingArbiter {
            calls: AtomicUsize::new(0),
        });
        let state = state_with(arbiter.clone());
        let (code, mut rx) = two_player_room(&state, 3).await;
        drain(&mut rx);

        tokio::time::sleep(Duration::from_secs(151)).await;
        assert_eq!(arbiter.calls.load(Ordering::SeqCst), 1);
        let messages = drain(&mut rx);
        assert!(!messages.iter().any(|m| matches!(m, ServerMessage::FreezeGame)));
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::RoundEnd { round: 1, .. })));
        assert_eq!(state.get_snapshot(&code).await.unwrap().phase, RoomPhase::Grading);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = state.get_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.phase, RoomPhase::Playing);
        assert_eq!(snapshot.round, 2);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, ServerMessage::RoundStart { round: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_referee_still_advances() {
        let state = state_with(Arc::new(PanickingArbiter));
        let (code, mut rx) = two_player_room(&state, 2).await;
        drain(&mut rx);

        state.finish_round(&code, "p1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let messages = drain(&mut rx);
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::ErrorMessage { code, .. } if code == "REFEREE_FAILED"
        )));
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::RoundEnd { results, notice: Some(_), .. } if results.is_empty()
        )));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = state.get_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.phase, RoomPhase::Playing);
        assert_eq!(snapshot.round, 2);
        assert!(snapshot.players.iter().all(|p| p.score == 0));

        // Last round fails too, and the game still ends
        state.finish_round(&code, "p2").await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(
            state.get_snapshot(&code).await.unwrap().phase,
            RoomPhase::Ended
        );
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, ServerMessage::GameOver { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cumulative_score_is_sum_of_rounds() {
        let arbiter = Arc::new(CountingArbiter {
            calls: AtomicUsize::new(0),
        });
        let state = state_with(arbiter);
        let (code, mut rx) = two_player_room(&state, 3).await;

        let mut round_totals: BTreeMap<PlayerId, u32> = BTreeMap::new();
        for round in 1..=3u32 {
            let letter = current_letter(&state, &code).await;
            state
                .set_input(&code, "p1", round, Category::Name, &format!("{}a", letter))
                .await
                .unwrap();
            state
                .set_input(&code, "p1", round, Category::Thing, &format!("{}x", letter))
                .await
                .unwrap();
            state
                .set_input(&code, "p2", round, Category::Name, &format!("{}A", letter))
                .await
                .unwrap();

            drain(&mut rx);
            state.finish_round(&code, "p2").await.unwrap();
            tokio::time::sleep(Duration::from_secs(6)).await;

            for msg in drain(&mut rx) {
                if let ServerMessage::RoundEnd { results, .. } = msg {
                    for (id, result) in results {
                        *round_totals.entry(id.clone()).or_default() += result.round_score;
                        assert_eq!(result.total_score, round_totals[&id]);
                    }
                }
            }
        }

        // p1: shared name (5) + unique thing (10); p2: shared name (5)
        assert_eq!(round_totals["p1"], 45);
        assert_eq!(round_totals["p2"], 15);
        let snapshot = state.get_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.phase, RoomPhase::Ended);
        assert_eq!(snapshot.players[0].score, 45);
        assert_eq!(snapshot.players[1].score, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_start_rules() {
        let state = Arc::new(AppState::default());
        let (code, _rx) = state
            .create_room(&"p1".to_string(), "Isha", None)
            .await
            .unwrap();
        state
            .join_room(&code, &"p2".to_string(), "Ishant", None)
            .await
            .unwrap();

        assert_eq!(
            state.force_start(&code, "p2", None).await,
            Err(RoomError::NotHost)
        );
        assert_eq!(
            state.force_start(&code, "ghost", None).await,
            Err(RoomError::NotMember)
        );
        assert_eq!(
            state.force_start("NOPE42", "p1", None).await,
            Err(RoomError::NotFound)
        );

        state.force_start(&code, "p1", Some(-1)).await.unwrap();
        let snapshot = state.get_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.total_rounds, 10);
        assert_eq!(
            state.force_start(&code, "p1", Some(3)).await,
            Err(RoomError::AlreadyStarted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_letters_do_not_repeat_within_game() {
        let state = state_with(Arc::new(CountingArbiter {
            calls: AtomicUsize::new(0),
        }));
        let (code, _rx) = two_player_room(&state, 26).await;

        let mut seen = std::collections::HashSet::new();
        for _ in 0..26 {
            assert!(seen.insert(current_letter(&state, &code).await));
            state.finish_round(&code, "p1").await.unwrap();
            tokio::time::sleep(Duration::from_secs(6)).await;
        }
        assert_eq!(seen.len(), 26);
        assert_eq!(
            state.get_snapshot(&code).await.unwrap().phase,
            RoomPhase::Ended
        );
    }
}
