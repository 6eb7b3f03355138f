// src/session.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::{
    error::AppError,
    loader::QuestionSet,
    models::{game::Game, participant::PlayerRef},
    scorer::{self, ScoreSummary},
    store::GameStore,
};

/// Events a client can feed into a running session.
#[derive(Debug)]
pub enum SessionEvent {
    /// Confirms participation and starts the first question's countdown.
    Confirm,
    /// Answers the question at `index` (1-based). Submissions for any
    /// other index are ignored; the question they belong to is already
    /// settled.
    Submit { index: usize, option: String },
    /// Abandons the session and withdraws from the game.
    Leave,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every question was answered or timed out; the participant is
    /// marked completed and scored.
    Completed(ScoreSummary),
    /// The player left; their participant row was deleted.
    Left,
    /// The client went away before confirming.
    Detached,
}

/// Drives one participant through the timed questions of one game.
///
/// The session is a single task owning its countdowns and answer buffer;
/// each question is settled by exactly one of {submission, expiry},
/// whichever happens first. Progress never depends on the client: with no
/// input the countdowns run out one by one and the session completes with
/// blank answers.
pub struct QuizSession {
    store: Arc<dyn GameStore>,
    game_id: i64,
    player: PlayerRef,
    questions: QuestionSet,
    budget: Duration,
    answers: Vec<String>,
}

impl QuizSession {
    pub fn new(
        store: Arc<dyn GameStore>,
        game: &Game,
        player: PlayerRef,
        questions: QuestionSet,
        mut initial_answers: Vec<String>,
    ) -> Self {
        let budget = Duration::from_secs_f64(game.question_budget_secs());
        initial_answers.resize(questions.len(), String::new());
        Self {
            store,
            game_id: game.id,
            player,
            questions,
            budget,
            answers: initial_answers,
        }
    }

    /// Spawns the session task and returns the handle used to drive it.
    pub fn spawn(self) -> SessionHandle {
        let (events_tx, events_rx) = mpsc::channel(16);
        let task = tokio::spawn(self.run(events_rx));
        SessionHandle {
            events: events_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut events: mpsc::Receiver<SessionEvent>,
    ) -> Result<SessionOutcome, AppError> {
        // AwaitingConfirmation: no countdown runs yet.
        loop {
            match events.recv().await {
                Some(SessionEvent::Confirm) => break,
                Some(SessionEvent::Leave) => {
                    self.withdraw().await;
                    return Ok(SessionOutcome::Left);
                }
                // No question is on screen yet.
                Some(SessionEvent::Submit { .. }) => continue,
                None => return Ok(SessionOutcome::Detached),
            }
        }

        tracing::info!(
            "Player {} started game {} ({} questions, {:?} each)",
            self.player.nickname,
            self.game_id,
            self.questions.len(),
            self.budget
        );

        let mut detached = false;
        for index in 1..=self.questions.len() {
            let deadline = Instant::now() + self.budget;

            let answer = loop {
                if detached {
                    time::sleep_until(deadline).await;
                    break String::new();
                }
                tokio::select! {
                    _ = time::sleep_until(deadline) => break String::new(),
                    event = events.recv() => match event {
                        Some(SessionEvent::Submit { index: i, option }) if i == index => {
                            break option;
                        }
                        // Late submission for a settled question, or a
                        // redundant confirm. Dropped.
                        Some(SessionEvent::Submit { .. }) | Some(SessionEvent::Confirm) => continue,
                        Some(SessionEvent::Leave) => {
                            self.withdraw().await;
                            return Ok(SessionOutcome::Left);
                        }
                        None => {
                            detached = true;
                            continue;
                        }
                    }
                }
            };

            self.answers[index - 1] = answer;

            // Best-effort persistence: a failed save must not strand the
            // player on the current question.
            if let Err(e) = self
                .store
                .save_answers(self.game_id, &self.player, &self.answers)
                .await
            {
                tracing::warn!(
                    "Failed to save answer {} for {} in game {}: {}",
                    index,
                    self.player.nickname,
                    self.game_id,
                    e
                );
            }
        }

        // Completing: these writes must land, so failures surface.
        self.store
            .mark_completed(self.game_id, &self.player)
            .await?;
        let summary = scorer::score_and_record(self.store.as_ref(), self.game_id, &self.player)
            .await?;

        Ok(SessionOutcome::Completed(summary))
    }

    /// Single-attempt withdrawal; leaving twice is a no-op at the store.
    async fn withdraw(&self) {
        if let Err(e) = self.store.leave_game(self.game_id, &self.player).await {
            tracing::warn!(
                "Failed to remove {} from game {}: {}",
                self.player.nickname,
                self.game_id,
                e
            );
        }
    }
}

/// Client-side handle to a spawned session.
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    task: JoinHandle<Result<SessionOutcome, AppError>>,
}

impl SessionHandle {
    pub fn confirm(&self) -> Result<(), AppError> {
        self.send(SessionEvent::Confirm)
    }

    pub fn submit(&self, index: usize, option: String) -> Result<(), AppError> {
        self.send(SessionEvent::Submit { index, option })
    }

    pub fn leave(&self) -> Result<(), AppError> {
        self.send(SessionEvent::Leave)
    }

    /// True once the session task has ended, for any reason.
    pub fn is_finished(&self) -> bool {
        self.events.is_closed()
    }

    /// Waits for the session to end and returns its outcome.
    pub async fn finished(self) -> Result<SessionOutcome, AppError> {
        self.task
            .await
            .map_err(|e| AppError::Persistence(format!("session task failed: {}", e)))?
    }

    fn send(&self, event: SessionEvent) -> Result<(), AppError> {
        use mpsc::error::TrySendError;
        self.events.try_send(event).map_err(|e| match e {
            TrySendError::Closed(_) => {
                AppError::InvalidState("Session is not running".to_string())
            }
            TrySendError::Full(_) => AppError::Conflict("Session is busy".to_string()),
        })
    }
}

/// Live sessions keyed by game and player, shared by the play handlers.
/// Entries are pruned lazily when a dead session is touched.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<(i64, PlayerRef), SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session. Fails with `Conflict` while a live session
    /// exists for the same player; a finished one is replaced.
    pub fn insert(
        &self,
        game_id: i64,
        player: PlayerRef,
        handle: SessionHandle,
    ) -> Result<(), AppError> {
        let mut sessions = self.lock();
        let key = (game_id, player);
        if let Some(existing) = sessions.get(&key) {
            if !existing.is_finished() {
                return Err(AppError::Conflict(
                    "A session is already running for this player".to_string(),
                ));
            }
        }
        sessions.insert(key, handle);
        Ok(())
    }

    /// Runs `f` against the live session for this player. Fails with
    /// `NotFound` when there is none; prunes the entry when the session
    /// turns out to have finished.
    pub fn with_session<T>(
        &self,
        game_id: i64,
        player: &PlayerRef,
        f: impl FnOnce(&SessionHandle) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut sessions = self.lock();
        let key = (game_id, player.clone());
        let Some(handle) = sessions.get(&key) else {
            return Err(AppError::NotFound("No session for this player".to_string()));
        };
        if handle.is_finished() {
            sessions.remove(&key);
            return Err(AppError::InvalidState("Session is not running".to_string()));
        }
        f(handle)
    }

    /// Removes the entry, returning whether a live session was dismissed.
    pub fn remove(&self, game_id: i64, player: &PlayerRef) -> Option<SessionHandle> {
        self.lock().remove(&(game_id, player.clone()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(i64, PlayerRef), SessionHandle>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;
    use crate::models::game::GameState;
    use crate::models::question::QuestionEntry;
    use crate::store::{MemGameStore, NewGame};

    const OWNER: &str = "addr_test1qhost";

    async fn seeded_game(store: &MemGameStore, question_count: i32) -> Game {
        let game = store
            .create_game(NewGame {
                owner: OWNER.to_string(),
                title: "Capital cities".to_string(),
                passcode: 7001,
                reward_amount: 40,
                question_count,
                duration_minutes: 2,
            })
            .await
            .unwrap();

        for idx in 1..=question_count {
            store
                .save_question(
                    game.id,
                    idx,
                    &QuestionEntry {
                        content: format!("Question {}", idx),
                        options: vec!["w".into(), "x".into(), "y".into(), "z".into()],
                        correct_option: "A".to_string(),
                        points: 100,
                    },
                )
                .await
                .unwrap();
        }

        store.set_state(game.id, GameState::Active).await.unwrap();
        store.game_by_id(game.id).await.unwrap().unwrap()
    }

    async fn joined_session(
        store: &Arc<MemGameStore>,
        game: &Game,
        nickname: &str,
    ) -> (PlayerRef, SessionHandle) {
        let player = PlayerRef {
            address: "addr_test1qplayer".to_string(),
            nickname: nickname.to_string(),
        };
        store.join_game(game.id, &player).await.unwrap();

        let questions = loader::load_question_set(store.as_ref(), game.id, game.question_count)
            .await
            .unwrap();
        let session = QuizSession::new(
            Arc::clone(store) as Arc<dyn GameStore>,
            game,
            player.clone(),
            questions,
            Vec::new(),
        );
        (player, session.spawn())
    }

    #[tokio::test(start_paused = true)]
    async fn all_timeouts_complete_with_blank_answers() {
        let store = Arc::new(MemGameStore::new());
        let game = seeded_game(&store, 10).await;
        let (player, handle) = joined_session(&store, &game, "mallory").await;

        handle.confirm().unwrap();

        let started = Instant::now();
        let outcome = handle.finished().await.unwrap();

        // 10 questions at 12s each (2 minutes / 10 questions).
        assert_eq!(started.elapsed(), Duration::from_secs(120));
        assert_eq!(
            outcome,
            SessionOutcome::Completed(ScoreSummary {
                total_points: 0,
                max_points: 1000,
            })
        );

        let row = store.participant(game.id, &player).await.unwrap().unwrap();
        assert!(row.completed);
        assert_eq!(row.points, 0);
        assert_eq!(row.answers.0, vec![String::new(); 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn submitted_answers_are_scored_in_order() {
        let store = Arc::new(MemGameStore::new());
        let game = seeded_game(&store, 10).await;
        let (player, handle) = joined_session(&store, &game, "alice").await;

        handle.confirm().unwrap();
        // Answer the first three questions; let the rest time out.
        handle.submit(1, "A".to_string()).unwrap();
        handle.submit(2, "B".to_string()).unwrap();
        handle.submit(3, "A".to_string()).unwrap();

        let outcome = handle.finished().await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Completed(ScoreSummary {
                total_points: 200,
                max_points: 1000,
            })
        );

        let row = store.participant(game.id, &player).await.unwrap().unwrap();
        assert_eq!(row.answers.0[0], "A");
        assert_eq!(row.answers.0[1], "B");
        assert_eq!(row.answers.0[2], "A");
        assert!(row.answers.0[3..].iter().all(String::is_empty));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_submission_does_not_touch_a_settled_question() {
        let store = Arc::new(MemGameStore::new());
        let game = seeded_game(&store, 10).await;
        let (player, handle) = joined_session(&store, &game, "bob").await;

        handle.confirm().unwrap();
        // Question 1 is settled by this submission; the late duplicate
        // for index 1 must not leak into question 2.
        handle.submit(1, "B".to_string()).unwrap();
        handle.submit(1, "C".to_string()).unwrap();

        let outcome = handle.finished().await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Completed(_)));

        let row = store.participant(game.id, &player).await.unwrap().unwrap();
        assert_eq!(row.answers.0[0], "B");
        assert_eq!(row.answers.0[1], "");
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_removes_the_participant() {
        let store = Arc::new(MemGameStore::new());
        let game = seeded_game(&store, 10).await;
        let (player, handle) = joined_session(&store, &game, "carol").await;

        handle.confirm().unwrap();
        handle.submit(1, "A".to_string()).unwrap();
        handle.leave().unwrap();

        let outcome = handle.finished().await.unwrap();
        assert_eq!(outcome, SessionOutcome::Left);

        assert!(store.participant(game.id, &player).await.unwrap().is_none());
        let refreshed = store.game_by_id(game.id).await.unwrap().unwrap();
        assert_eq!(refreshed.current_participants, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_before_confirmation_discards_the_session() {
        let store = Arc::new(MemGameStore::new());
        let game = seeded_game(&store, 10).await;
        let (player, handle) = joined_session(&store, &game, "dave").await;

        handle.leave().unwrap();

        let outcome = handle.finished().await.unwrap();
        assert_eq!(outcome, SessionOutcome::Left);
        assert!(store.participant(game.id, &player).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_lets_countdowns_finish_the_session() {
        let store = Arc::new(MemGameStore::new());
        let game = seeded_game(&store, 10).await;
        let (player, handle) = joined_session(&store, &game, "erin").await;

        handle.confirm().unwrap();
        handle.submit(1, "A".to_string()).unwrap();

        let task = handle.task;
        drop(handle.events);

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Completed(ScoreSummary {
                total_points: 100,
                max_points: 1000,
            })
        );

        let row = store.participant(game.id, &player).await.unwrap().unwrap();
        assert!(row.completed);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_rejects_a_second_live_session() {
        let store = Arc::new(MemGameStore::new());
        let game = seeded_game(&store, 10).await;
        let registry = SessionRegistry::new();

        let (player, first) = joined_session(&store, &game, "frank").await;
        registry.insert(game.id, player.clone(), first).unwrap();

        let questions = loader::load_question_set(store.as_ref(), game.id, game.question_count)
            .await
            .unwrap();
        let second = QuizSession::new(
            Arc::clone(&store) as Arc<dyn GameStore>,
            &game,
            player.clone(),
            questions,
            Vec::new(),
        )
        .spawn();

        let err = registry.insert(game.id, player.clone(), second).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        registry
            .with_session(game.id, &player, |handle| handle.confirm())
            .unwrap();
    }
}
