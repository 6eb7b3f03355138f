// src/loader.rs

use serde::Serialize;

use crate::{error::AppError, store::GameStore};

/// The questions of one game as two parallel fixed-length sequences,
/// indexed 1..=N via position. Slots the host never saved stay blank.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionSet {
    pub questions: Vec<String>,
    pub options: Vec<Vec<String>>,
}

impl QuestionSet {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Fetches the stored question rows for a game and normalizes them into a
/// sequence of exactly `question_count` entries. Fails with `NotFound`
/// when the game has no question rows at all.
pub async fn load_question_set(
    store: &dyn GameStore,
    game_id: i64,
    question_count: i32,
) -> Result<QuestionSet, AppError> {
    let rows = store.question_rows(game_id).await?;
    if rows.is_empty() {
        return Err(AppError::NotFound(
            "No questions found for this game".to_string(),
        ));
    }

    let n = question_count.max(0) as usize;
    let mut questions = vec![String::new(); n];
    let mut options = vec![Vec::new(); n];

    for row in rows {
        if row.idx >= 1 && (row.idx as usize) <= n {
            let slot = row.idx as usize - 1;
            questions[slot] = row.content;
            options[slot] = row.options.0;
        }
    }

    Ok(QuestionSet { questions, options })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionEntry;
    use crate::store::{MemGameStore, NewGame};

    async fn seeded_store() -> (MemGameStore, i64) {
        let store = MemGameStore::new();
        let game = store
            .create_game(NewGame {
                owner: "addr_test1owner".to_string(),
                title: "History night".to_string(),
                passcode: 4321,
                reward_amount: 50,
                question_count: 10,
                duration_minutes: 2,
            })
            .await
            .unwrap();
        (store, game.id)
    }

    #[tokio::test]
    async fn missing_slots_default_to_blank() {
        let (store, game_id) = seeded_store().await;

        // Only questions 1 and 3 were ever saved.
        for idx in [1, 3] {
            store
                .save_question(
                    game_id,
                    idx,
                    &QuestionEntry {
                        content: format!("Question {}", idx),
                        options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                        correct_option: "A".to_string(),
                        points: 100,
                    },
                )
                .await
                .unwrap();
        }

        let set = load_question_set(&store, game_id, 10).await.unwrap();
        assert_eq!(set.len(), 10);
        assert_eq!(set.questions[0], "Question 1");
        assert_eq!(set.questions[1], "");
        assert_eq!(set.questions[2], "Question 3");
        assert_eq!(set.options[0].len(), 4);
        assert!(set.options[1].is_empty());
    }

    #[tokio::test]
    async fn fails_when_no_questions_exist() {
        let (store, game_id) = seeded_store().await;

        let err = load_question_set(&store, game_id, 10).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn rows_beyond_question_count_are_ignored() {
        let (store, game_id) = seeded_store().await;

        for idx in [1, 15] {
            store
                .save_question(
                    game_id,
                    idx,
                    &QuestionEntry {
                        content: format!("Question {}", idx),
                        options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                        correct_option: String::new(),
                        points: 100,
                    },
                )
                .await
                .unwrap();
        }

        let set = load_question_set(&store, game_id, 10).await.unwrap();
        assert_eq!(set.len(), 10);
        assert!(set.questions.iter().all(|q| q != "Question 15"));
    }
}
