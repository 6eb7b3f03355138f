// src/handlers/players.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError, models::participant::JoinRequest, session::SessionRegistry,
    store::GameStore,
};

/// Takes a seat in an active game. The seat count and capacity check are
/// a single conditional write in the store, so two players cannot race
/// past the limit.
pub async fn join_game(
    State(store): State<Arc<dyn GameStore>>,
    Path(passcode): Path<i32>,
    Json(payload): Json<JoinRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    store.join_game(game.id, &payload.player()).await?;

    tracing::info!("{} joined game {}", payload.nickname, passcode);
    Ok(Json(json!({ "success": true })))
}

/// Gives the seat back. Safe to call twice; the second call is a no-op.
/// A running quiz session for this player is abandoned along the way.
pub async fn leave_game(
    State(store): State<Arc<dyn GameStore>>,
    State(sessions): State<SessionRegistry>,
    Path(passcode): Path<i32>,
    Json(payload): Json<JoinRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    let player = payload.player();

    // Let a live session do the withdrawal itself so its timers stop.
    let mut withdrawn = false;
    if let Some(handle) = sessions.remove(game.id, &player) {
        if !handle.is_finished() && handle.leave().is_ok() {
            withdrawn = true;
        }
    }
    if !withdrawn {
        store.leave_game(game.id, &player).await?;
    }

    tracing::info!("{} left game {}", payload.nickname, passcode);
    Ok(Json(json!({ "success": true })))
}

/// Roster for the host dashboard: who joined and who already submitted.
pub async fn list_players(
    State(store): State<Arc<dyn GameStore>>,
    Path(passcode): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    let players: Vec<_> = store
        .participants(game.id)
        .await?
        .into_iter()
        .map(|p| {
            json!({
                "nickname": p.nickname,
                "address": p.address,
                "completed": p.completed,
            })
        })
        .collect();

    Ok(Json(players))
}
