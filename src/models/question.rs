// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::config::ALLOWED_QUESTION_POINTS;

/// One row of the 'questions' table: the text and options shown to players.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionRow {
    /// 1-based question index within the game.
    pub idx: i32,

    pub content: String,

    /// Ordered options A-D. Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,
}

/// One row of the 'answer_keys' table: what scoring needs for one index.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnswerKeyRow {
    pub idx: i32,

    /// 'A'..'D', or None when the host left the question unanswered.
    /// Indices without a correct option are excluded from scoring.
    pub correct_option: Option<String>,

    pub points: i64,
}

/// A question as the host edits it: content, options and key together.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionEntry {
    pub content: String,
    pub options: Vec<String>,
    /// Empty string when no correct option has been set.
    pub correct_option: String,
    pub points: i64,
}

impl QuestionEntry {
    /// What the host sees for an index that was never saved.
    pub fn blank() -> Self {
        Self {
            content: String::new(),
            options: vec![String::new(); 4],
            correct_option: String::new(),
            points: crate::config::DEFAULT_QUESTION_POINTS,
        }
    }
}

/// DTO for saving one question slot.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveQuestionRequest {
    #[validate(length(max = 1000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(custom(function = validate_correct_option))]
    pub correct_option: String,
    #[validate(custom(function = validate_points))]
    pub points: i64,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != 4 {
        return Err(validator::ValidationError::new("exactly_four_options"));
    }
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

fn validate_correct_option(option: &str) -> Result<(), validator::ValidationError> {
    match option {
        "" | "A" | "B" | "C" | "D" => Ok(()),
        _ => Err(validator::ValidationError::new("correct_option_out_of_range")),
    }
}

fn validate_points(points: i64) -> Result<(), validator::ValidationError> {
    if ALLOWED_QUESTION_POINTS.contains(&points) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("points_not_allowed"))
    }
}
