// src/store/mod.rs

use async_trait::async_trait;
use rand::Rng;

use crate::{
    error::AppError,
    models::{
        game::{Game, GameState, UpdateGameRequest},
        participant::{LeaderboardEntry, Participant, PlayerRef},
        question::{AnswerKeyRow, QuestionEntry, QuestionRow},
    },
};

pub mod mem;
pub mod pg;

pub use mem::MemGameStore;
pub use pg::PgGameStore;

/// Fields required to insert a game. The passcode is allocated by the
/// caller via [`allocate_passcode`].
#[derive(Debug, Clone)]
pub struct NewGame {
    pub owner: String,
    pub title: String,
    pub passcode: i32,
    pub reward_amount: i64,
    pub question_count: i32,
    pub duration_minutes: i32,
}

/// Persistence boundary for games, questions, answer keys and participants.
///
/// Capacity and payout checks that must not race between concurrent clients
/// (join, reward claim) are expressed as single conditional writes here, so
/// callers never do read-then-write around them.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn create_game(&self, new: NewGame) -> Result<Game, AppError>;

    /// True while a draft or active game holds the passcode.
    async fn passcode_in_use(&self, passcode: i32) -> Result<bool, AppError>;

    /// Resolves a passcode to its live (draft/active) game first, falling
    /// back to the most recently created ended game so finished
    /// leaderboards stay reachable.
    async fn game_by_passcode(&self, passcode: i32) -> Result<Option<Game>, AppError>;

    async fn game_by_id(&self, id: i64) -> Result<Option<Game>, AppError>;

    async fn games_by_owner(&self, owner: &str) -> Result<Vec<Game>, AppError>;

    async fn update_game(&self, id: i64, changes: &UpdateGameRequest) -> Result<Game, AppError>;

    /// Deletes the game and, through the schema, its questions, answer keys
    /// and participants.
    async fn delete_game(&self, id: i64) -> Result<(), AppError>;

    async fn set_state(&self, game_id: i64, state: GameState) -> Result<(), AppError>;

    /// Pre-activation reset: drops all participant rows, zeroes the
    /// participant counter and clears the payout flag and reference.
    async fn reset_participants(&self, game_id: i64) -> Result<(), AppError>;

    /// Records the gateway reference for the locked reward.
    async fn record_lock(&self, game_id: i64, tx_ref: &str) -> Result<(), AppError>;

    async fn question_rows(&self, game_id: i64) -> Result<Vec<QuestionRow>, AppError>;

    async fn answer_key(&self, game_id: i64) -> Result<Vec<AnswerKeyRow>, AppError>;

    /// Combined question + key for one index, as the host edits it.
    /// `None` when the index was never saved.
    async fn question_entry(
        &self,
        game_id: i64,
        idx: i32,
    ) -> Result<Option<QuestionEntry>, AppError>;

    async fn save_question(
        &self,
        game_id: i64,
        idx: i32,
        entry: &QuestionEntry,
    ) -> Result<(), AppError>;

    /// Inserts the participant and bumps the seat counter in one atomic
    /// step. Fails with `InvalidState` when the game is not active,
    /// `Capacity` when all seats are taken, `Conflict` when the same
    /// (address, nickname) already joined. Nothing is written on failure.
    async fn join_game(&self, game_id: i64, player: &PlayerRef) -> Result<(), AppError>;

    /// Removes the participant and decrements the seat counter (floor 0).
    /// Leaving a game never joined is a no-op.
    async fn leave_game(&self, game_id: i64, player: &PlayerRef) -> Result<(), AppError>;

    async fn participants(&self, game_id: i64) -> Result<Vec<Participant>, AppError>;

    async fn participant(
        &self,
        game_id: i64,
        player: &PlayerRef,
    ) -> Result<Option<Participant>, AppError>;

    /// Overwrites the participant's full answer sequence.
    async fn save_answers(
        &self,
        game_id: i64,
        player: &PlayerRef,
        answers: &[String],
    ) -> Result<(), AppError>;

    async fn mark_completed(&self, game_id: i64, player: &PlayerRef) -> Result<(), AppError>;

    async fn record_points(
        &self,
        game_id: i64,
        player: &PlayerRef,
        points: i64,
    ) -> Result<(), AppError>;

    /// Participants ordered by points descending, nickname ascending.
    async fn leaderboard(&self, game_id: i64) -> Result<Vec<LeaderboardEntry>, AppError>;

    /// Flips `reward_paid` to true only if it is currently false and
    /// reports whether this call won the flip. The gateway must only be
    /// invoked by the caller that won.
    async fn claim_reward_payout(&self, game_id: i64) -> Result<bool, AppError>;

    /// Undoes a claim whose gateway call failed, so a later reveal can
    /// retry the payout.
    async fn release_reward_claim(&self, game_id: i64) -> Result<(), AppError>;

    async fn record_reward_payment(&self, game_id: i64, tx_ref: &str) -> Result<(), AppError>;
}

const PASSCODE_ATTEMPTS: usize = 100;

/// Picks an unused 4-digit passcode by generate-and-check retry.
pub async fn allocate_passcode(store: &dyn GameStore) -> Result<i32, AppError> {
    for _ in 0..PASSCODE_ATTEMPTS {
        let candidate: i32 = rand::thread_rng().gen_range(1000..10000);
        if !store.passcode_in_use(candidate).await? {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict(
        "Could not allocate a free passcode".to_string(),
    ))
}
