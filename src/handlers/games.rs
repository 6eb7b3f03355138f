// src/handlers/games.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    error::AppError,
    gateway::PaymentGateway,
    models::game::{CreateGameRequest, GameState, UpdateGameRequest},
    store::{self, GameStore},
};

/// Creates a new draft game and assigns it a unique 4-digit passcode.
pub async fn create_game(
    State(store): State<Arc<dyn GameStore>>,
    Json(payload): Json<CreateGameRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let passcode = store::allocate_passcode(store.as_ref()).await?;

    let game = store
        .create_game(store::NewGame {
            owner: payload.owner,
            title: payload.title,
            passcode,
            reward_amount: payload.reward_amount,
            question_count: payload.question_count,
            duration_minutes: payload.duration_minutes,
        })
        .await?;

    tracing::info!("Game {} created with passcode {}", game.id, game.passcode);

    Ok((StatusCode::CREATED, Json(game)))
}

#[derive(Debug, Deserialize)]
pub struct ListGamesParams {
    pub owner: String,
}

/// Lists the games created by one host.
pub async fn list_games(
    State(store): State<Arc<dyn GameStore>>,
    Query(params): Query<ListGamesParams>,
) -> Result<impl IntoResponse, AppError> {
    let games = store.games_by_owner(&params.owner).await?;
    Ok(Json(games))
}

/// Updates a game's settings. Active games are locked.
pub async fn update_game(
    State(store): State<Arc<dyn GameStore>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateGameRequest>,
) -> Result<impl IntoResponse, AppError> {
    let game = store
        .game_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    if game.state == GameState::Active {
        return Err(AppError::InvalidState(
            "An active game cannot be edited".to_string(),
        ));
    }

    if let Some(title) = &payload.title {
        if title.is_empty() || title.len() > 100 {
            return Err(AppError::BadRequest("Invalid title".to_string()));
        }
    }
    if let Some(reward_amount) = payload.reward_amount {
        if reward_amount < 1 {
            return Err(AppError::BadRequest("Invalid reward amount".to_string()));
        }
    }
    if let Some(duration_minutes) = payload.duration_minutes {
        if !(1..=120).contains(&duration_minutes) {
            return Err(AppError::BadRequest("Invalid duration".to_string()));
        }
    }

    let updated = store.update_game(id, &payload).await?;
    Ok(Json(updated))
}

/// Deletes a game together with its questions, keys and participants.
pub async fn delete_game(
    State(store): State<Arc<dyn GameStore>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    store.delete_game(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Activates a game: wipes any previous run's participants, locks the
/// reward through the payment gateway, then opens the game for players.
/// A gateway failure leaves the game in its previous state.
pub async fn activate_game(
    State(store): State<Arc<dyn GameStore>>,
    State(gateway): State<Arc<dyn PaymentGateway>>,
    Path(passcode): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    if game.state == GameState::Active {
        return Err(AppError::InvalidState(
            "Game is already active".to_string(),
        ));
    }

    store.reset_participants(game.id).await?;

    let lock_ref = gateway.lock_funds(game.reward_amount).await?;
    store.record_lock(game.id, &lock_ref).await?;
    store.set_state(game.id, GameState::Active).await?;

    tracing::info!(
        "Game {} activated, reward {} locked at {}",
        passcode,
        game.reward_amount,
        lock_ref
    );

    let refreshed = store
        .game_by_id(game.id)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;
    Ok(Json(refreshed))
}

/// Ends an active game. Scores stay; the leaderboard reveal becomes
/// available.
pub async fn end_game(
    State(store): State<Arc<dyn GameStore>>,
    Path(passcode): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    if game.state != GameState::Active {
        return Err(AppError::InvalidState("Game is not active".to_string()));
    }

    store.set_state(game.id, GameState::Ended).await?;
    tracing::info!("Game {} ended", passcode);

    Ok(StatusCode::OK)
}
