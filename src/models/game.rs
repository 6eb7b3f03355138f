// src/models/game.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::config::ALLOWED_QUESTION_COUNTS;

/// Lifecycle of a game. Draft games are being edited by the host, active
/// games accept players, ended games only serve their leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "game_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Draft,
    Active,
    Ended,
}

/// Represents the 'games' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,

    /// Wallet address of the host.
    pub owner: String,

    pub title: String,

    /// 4-digit code players use to find the game. Unique among
    /// draft/active games; recycled once a game has ended.
    pub passcode: i32,

    pub reward_amount: i64,

    pub question_count: i32,

    pub duration_minutes: i32,

    pub max_participants: i32,

    pub current_participants: i32,

    pub state: GameState,

    /// Reference returned by the gateway when the reward was locked.
    pub lock_tx: Option<String>,

    /// Reference returned by the gateway when the winner was paid.
    pub reward_tx: Option<String>,

    pub reward_paid: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Game {
    /// Uniform per-question time budget, in seconds.
    pub fn question_budget_secs(&self) -> f64 {
        self.duration_minutes as f64 * 60.0 / self.question_count as f64
    }
}

/// DTO for creating a new game. The passcode is assigned server-side.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGameRequest {
    #[validate(length(min = 1, max = 200))]
    pub owner: String,
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters."))]
    pub title: String,
    #[validate(range(min = 1))]
    pub reward_amount: i64,
    #[validate(custom(function = validate_question_count))]
    pub question_count: i32,
    #[validate(range(min = 1, max = 120))]
    pub duration_minutes: i32,
}

/// DTO for updating a game. Fields are optional; the question count is
/// fixed when the game is created.
#[derive(Debug, Deserialize)]
pub struct UpdateGameRequest {
    pub title: Option<String>,
    pub reward_amount: Option<i64>,
    pub duration_minutes: Option<i32>,
}

fn validate_question_count(count: i32) -> Result<(), validator::ValidationError> {
    if ALLOWED_QUESTION_COUNTS.contains(&count) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("question_count_not_allowed"))
    }
}
