// src/handlers/leaderboard.rs

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};

use crate::{
    config::Config,
    error::AppError,
    gateway::PaymentGateway,
    models::game::GameState,
    reveal::{RevealConfig, RevealSequencer},
    store::GameStore,
};

/// Full leaderboard, points descending.
pub async fn get_leaderboard(
    State(store): State<Arc<dyn GameStore>>,
    Path(passcode): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    let entries = store.leaderboard(game.id).await?;
    Ok(Json(entries))
}

/// Streams the timed leaderboard reveal as server-sent events: one row
/// per tick from last place up to the winner, the payout resolution, and
/// a final completion event. The payout itself runs server-side and is
/// unaffected by clients disconnecting mid-stream.
pub async fn reveal_stream(
    State(store): State<Arc<dyn GameStore>>,
    State(gateway): State<Arc<dyn PaymentGateway>>,
    State(config): State<Config>,
    Path(passcode): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let game = store
        .game_by_passcode(passcode)
        .await?
        .ok_or(AppError::NotFound("Game not found".to_string()))?;

    if game.state != GameState::Ended {
        return Err(AppError::InvalidState(
            "End the game before revealing the leaderboard".to_string(),
        ));
    }

    let sequencer = RevealSequencer::new(
        store,
        gateway,
        RevealConfig {
            step: config.reveal_step,
            payout_delay: config.payout_delay,
        },
    );

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        if let Err(e) = sequencer.run(game, tx).await {
            tracing::error!("Leaderboard reveal failed: {}", e);
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok::<_, Infallible>(
            Event::default()
                .json_data(&event)
                .unwrap_or_else(|_| Event::default().data("{}")),
        )
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
