// src/handlers/play.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    loader,
    models::{
        game::GameState,
        participant::{JoinRequest, PlayerRef},
    },
    scorer,
    session::{QuizSession, SessionRegistry},
    store::GameStore,
};

/// Game lookup by passcode, for the join screen.
pub async fn game_info(
    State(store): State<Arc<dyn GameStore>>,
    Path(passcode): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;
    Ok(Json(game))
}

/// Creates the quiz session for a joined player. The session waits for
/// an explicit confirmation before the first countdown starts.
pub async fn start_session(
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

    if game.state != GameState::Active {
        return Err(AppError::InvalidState("Game is not active".to_string()));
    }

    let player = payload.player();
    let participant = store
        .participant(game.id, &player)
        .await?
        .ok_or(AppError::NotFound(
            "Join the game before starting the quiz".to_string(),
        ))?;

    if participant.completed {
        return Err(AppError::InvalidState(
            "Quiz already completed".to_string(),
        ));
    }

    let questions =
        loader::load_question_set(store.as_ref(), game.id, game.question_count).await?;

    let handle = QuizSession::new(
        store.clone(),
        &game,
        player.clone(),
        questions,
        participant.answers.0,
    )
    .spawn();
    sessions.insert(game.id, player, handle)?;

    Ok(Json(json!({
        "question_count": game.question_count,
        "seconds_per_question": game.question_budget_secs(),
    })))
}

/// Confirms participation; the first question's countdown starts now.
pub async fn confirm_session(
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

    sessions.with_session(game.id, &payload.player(), |handle| handle.confirm())?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, max = 200))]
    pub address: String,
    #[validate(length(min = 1, max = 50))]
    pub nickname: String,
    /// 1-based index of the question being answered.
    #[validate(range(min = 1))]
    pub index: u32,
    #[validate(custom(function = validate_option_letter))]
    pub option: String,
}

fn validate_option_letter(option: &str) -> Result<(), validator::ValidationError> {
    match option {
        "A" | "B" | "C" | "D" => Ok(()),
        _ => Err(validator::ValidationError::new("option_out_of_range")),
    }
}

/// Submits the answer for one question. Arriving after that question's
/// countdown has fired is not an error; the submission is simply dropped.
pub async fn submit_answer(
    State(store): State<Arc<dyn GameStore>>,
    State(sessions): State<SessionRegistry>,
    Path(passcode): Path<i32>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    let player = PlayerRef {
        address: payload.address,
        nickname: payload.nickname,
    };

    sessions.with_session(game.id, &player, |handle| {
        handle.submit(payload.index as usize, payload.option.clone())
    })?;

    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct ResultParams {
    pub address: String,
    pub nickname: String,
}

/// Final score for one player: points earned against the points at stake.
pub async fn result(
    State(store): State<Arc<dyn GameStore>>,
    Path(passcode): Path<i32>,
    Query(params): Query<ResultParams>,
) -> Result<impl IntoResponse, AppError> {
    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    let player = PlayerRef {
        address: params.address,
        nickname: params.nickname,
    };
    let participant = store
        .participant(game.id, &player)
        .await?
        .ok_or(AppError::NotFound("Player not found".to_string()))?;

    let key = store.answer_key(game.id).await?;

    Ok(Json(json!({
        "completed": participant.completed,
        "points": participant.points,
        "max_points": scorer::max_points(&key),
    })))
}
