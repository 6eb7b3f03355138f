// src/handlers/mod.rs

pub mod games;
pub mod leaderboard;
pub mod play;
pub mod players;
pub mod questions;
