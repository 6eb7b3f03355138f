// src/models/participant.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Represents the 'participants' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Participant {
    pub address: String,

    pub nickname: String,

    /// One entry per question index; empty string means no answer.
    /// Stored as a JSON array in the database.
    pub answers: Json<Vec<String>>,

    /// Set once the player has been through every question.
    pub completed: bool,

    pub points: i64,
}

/// Identifies one player within one game. Players are keyed by wallet
/// address plus the nickname they picked when joining.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerRef {
    pub address: String,
    pub nickname: String,
}

/// DTO for joining or leaving a game.
#[derive(Debug, Deserialize, Validate)]
pub struct JoinRequest {
    #[validate(length(min = 1, max = 200))]
    pub address: String,
    #[validate(length(min = 1, max = 50, message = "Nickname must be between 1 and 50 characters."))]
    pub nickname: String,
}

impl JoinRequest {
    pub fn player(&self) -> PlayerRef {
        PlayerRef {
            address: self.address.clone(),
            nickname: self.nickname.clone(),
        }
    }
}

/// One leaderboard row, sorted by points descending.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaderboardEntry {
    pub nickname: String,
    pub address: String,
    pub points: i64,
}
