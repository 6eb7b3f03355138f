// src/config.rs

use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Fixed seat limit per game.
pub const MAX_PARTICIPANTS: i32 = 5;

/// The store keeps 20 question slots per game; games use the first
/// `question_count` of them.
pub const QUESTION_SLOTS: usize = 20;

pub const ALLOWED_QUESTION_COUNTS: [i32; 3] = [10, 15, 20];
pub const ALLOWED_QUESTION_POINTS: [i64; 3] = [100, 150, 200];
pub const DEFAULT_QUESTION_POINTS: i64 = 100;

/// Seconds between leaderboard reveal rows.
pub const REVEAL_STEP_SECS: u64 = 4;
/// Seconds between revealing the winner and settling the reward.
pub const PAYOUT_DELAY_SECS: u64 = 2;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gateway_url: String,
    pub gateway_api_key: Option<String>,
    pub rust_log: String,
    pub reveal_step: Duration,
    pub payout_delay: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let gateway_url =
            env::var("PAYMENT_GATEWAY_URL").expect("PAYMENT_GATEWAY_URL must be set");

        let gateway_api_key = env::var("PAYMENT_GATEWAY_KEY").ok();

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let reveal_step = env::var("REVEAL_STEP_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(REVEAL_STEP_SECS));

        let payout_delay = env::var("PAYOUT_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(PAYOUT_DELAY_SECS));

        Self {
            database_url,
            gateway_url,
            gateway_api_key,
            rust_log,
            reveal_step,
            payout_delay,
        }
    }
}
