// src/scorer.rs

use serde::Serialize;

use crate::{
    config::QUESTION_SLOTS,
    error::AppError,
    models::{participant::PlayerRef, question::AnswerKeyRow},
    store::GameStore,
};

/// Result of scoring one participant against the answer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    pub total_points: i64,
    pub max_points: i64,
}

/// Compares an answer sequence against the answer key.
///
/// Only key rows with a correct option count toward `max_points`; a row's
/// points are earned when the participant's answer at that index matches
/// the correct option, ignoring case and surrounding whitespace. Indices
/// the participant never reached (or timed out on) simply earn nothing.
pub fn tally(answers: &[String], key: &[AnswerKeyRow]) -> ScoreSummary {
    let mut total_points = 0;
    let mut max_points = 0;

    for row in key {
        if row.idx < 1 || row.idx as usize > QUESTION_SLOTS {
            continue;
        }
        let Some(correct) = row.correct_option.as_deref().filter(|c| !c.trim().is_empty()) else {
            continue;
        };

        max_points += row.points;

        let given = answers
            .get(row.idx as usize - 1)
            .map(String::as_str)
            .unwrap_or("");
        if given.trim().eq_ignore_ascii_case(correct.trim()) {
            total_points += row.points;
        }
    }

    ScoreSummary {
        total_points,
        max_points,
    }
}

/// Sum of points over the scorable slots, independent of any answers.
pub fn max_points(key: &[AnswerKeyRow]) -> i64 {
    tally(&[], key).max_points
}

/// Loads the answer key and the participant's stored answers, tallies
/// them, and persists the result as the participant's points.
pub async fn score_and_record(
    store: &dyn GameStore,
    game_id: i64,
    player: &PlayerRef,
) -> Result<ScoreSummary, AppError> {
    let key = store.answer_key(game_id).await?;
    if key.is_empty() {
        return Err(AppError::NotFound(
            "No answer key found for this game".to_string(),
        ));
    }

    let participant = store
        .participant(game_id, player)
        .await?
        .ok_or(AppError::NotFound("Player not found".to_string()))?;

    if participant.answers.is_empty() {
        return Err(AppError::NotFound(
            "No answers recorded for this player".to_string(),
        ));
    }

    let summary = tally(&participant.answers, &key);
    store
        .record_points(game_id, player, summary.total_points)
        .await?;

    tracing::info!(
        "Scored {} in game {}: {}/{}",
        player.nickname,
        game_id,
        summary.total_points,
        summary.max_points
    );

    Ok(summary)
}
