// src/handlers/questions.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        game::GameState,
        question::{QuestionEntry, SaveQuestionRequest},
    },
    store::GameStore,
};

/// Fetches one question slot as the host edits it. Slots that were never
/// saved come back blank with default points.
pub async fn get_question(
    State(store): State<Arc<dyn GameStore>>,
    Path((passcode, index)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError> {
    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    if index < 1 || index > game.question_count {
        return Err(AppError::BadRequest(format!(
            "Question index must be between 1 and {}",
            game.question_count
        )));
    }

    let entry = store
        .question_entry(game.id, index)
        .await?
        .unwrap_or_else(QuestionEntry::blank);

    Ok(Json(entry))
}

/// Saves one question slot (text, options, correct option and points).
/// Questions are immutable while the game is active.
pub async fn save_question(
    State(store): State<Arc<dyn GameStore>>,
    Path((passcode, index)): Path<(i32, i32)>,
    Json(payload): Json<SaveQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    if game.state == GameState::Active {
        return Err(AppError::InvalidState(
            "Questions are locked while the game is active".to_string(),
        ));
    }

    if index < 1 || index > game.question_count {
        return Err(AppError::BadRequest(format!(
            "Question index must be between 1 and {}",
            game.question_count
        )));
    }

    let entry = QuestionEntry {
        content: payload.content,
        options: payload.options,
        correct_option: payload.correct_option,
        points: payload.points,
    };
    store.save_question(game.id, index, &entry).await?;

    Ok(StatusCode::OK)
}
