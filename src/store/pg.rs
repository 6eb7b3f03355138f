// src/store/pg.rs

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};

use crate::{
    config::MAX_PARTICIPANTS,
    error::AppError,
    models::{
        game::{Game, GameState, UpdateGameRequest},
        participant::{LeaderboardEntry, Participant, PlayerRef},
        question::{AnswerKeyRow, QuestionEntry, QuestionRow},
    },
};

use super::{GameStore, NewGame};

const GAME_COLUMNS: &str = "id, owner, title, passcode, reward_amount, question_count, \
     duration_minutes, max_participants, current_participants, state, \
     lock_tx, reward_tx, reward_paid, created_at";

/// Postgres-backed implementation of [`GameStore`].
pub struct PgGameStore {
    pool: PgPool,
}

impl PgGameStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    async fn create_game(&self, new: NewGame) -> Result<Game, AppError> {
        let game = sqlx::query_as::<_, Game>(&format!(
            "INSERT INTO games \
             (owner, title, passcode, reward_amount, question_count, duration_minutes, max_participants) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {GAME_COLUMNS}"
        ))
        .bind(&new.owner)
        .bind(&new.title)
        .bind(new.passcode)
        .bind(new.reward_amount)
        .bind(new.question_count)
        .bind(new.duration_minutes)
        .bind(MAX_PARTICIPANTS)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // Postgres error code for unique violation is 23505
            if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
                AppError::Conflict("Passcode was taken concurrently".to_string())
            } else {
                tracing::error!("Failed to create game: {:?}", e);
                AppError::from(e)
            }
        })?;

        Ok(game)
    }

    async fn passcode_in_use(&self, passcode: i32) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 FROM games WHERE passcode = $1 AND state <> 'ended'")
            .bind(passcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn game_by_passcode(&self, passcode: i32) -> Result<Option<Game>, AppError> {
        let game = sqlx::query_as::<_, Game>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE passcode = $1 \
             ORDER BY (state = 'ended') ASC, created_at DESC LIMIT 1"
        ))
        .bind(passcode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(game)
    }

    async fn game_by_id(&self, id: i64) -> Result<Option<Game>, AppError> {
        let game =
            sqlx::query_as::<_, Game>(&format!("SELECT {GAME_COLUMNS} FROM games WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(game)
    }

    async fn games_by_owner(&self, owner: &str) -> Result<Vec<Game>, AppError> {
        let games = sqlx::query_as::<_, Game>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE owner = $1 ORDER BY created_at DESC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(games)
    }

    async fn update_game(&self, id: i64, changes: &UpdateGameRequest) -> Result<Game, AppError> {
        if changes.title.is_none()
            && changes.reward_amount.is_none()
            && changes.duration_minutes.is_none()
        {
            return self
                .game_by_id(id)
                .await?
                .ok_or(AppError::NotFound("Game not found".to_string()));
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE games SET ");
        let mut separated = builder.separated(", ");

        if let Some(title) = &changes.title {
            separated.push("title = ");
            separated.push_bind_unseparated(title);
        }

        if let Some(reward_amount) = changes.reward_amount {
            separated.push("reward_amount = ");
            separated.push_bind_unseparated(reward_amount);
        }

        if let Some(duration_minutes) = changes.duration_minutes {
            separated.push("duration_minutes = ");
            separated.push_bind_unseparated(duration_minutes);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&self.pool).await.map_err(|e| {
            tracing::error!("Failed to update game: {:?}", e);
            AppError::from(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Game not found".to_string()));
        }

        self.game_by_id(id)
            .await?
            .ok_or(AppError::NotFound("Game not found".to_string()))
    }

    async fn delete_game(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM games WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Game not found".to_string()));
        }
        Ok(())
    }

    async fn set_state(&self, game_id: i64, state: GameState) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE games SET state = $2 WHERE id = $1")
            .bind(game_id)
            .bind(state)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Game not found".to_string()));
        }
        Ok(())
    }

    async fn reset_participants(&self, game_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE games SET current_participants = 0, reward_paid = FALSE, reward_tx = NULL \
             WHERE id = $1",
        )
        .bind(game_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM participants WHERE game_id = $1")
            .bind(game_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_lock(&self, game_id: i64, tx_ref: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE games SET lock_tx = $2 WHERE id = $1")
            .bind(game_id)
            .bind(tx_ref)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn question_rows(&self, game_id: i64) -> Result<Vec<QuestionRow>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            "SELECT idx, content, options FROM questions WHERE game_id = $1 ORDER BY idx",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn answer_key(&self, game_id: i64) -> Result<Vec<AnswerKeyRow>, AppError> {
        let rows = sqlx::query_as::<_, AnswerKeyRow>(
            "SELECT idx, correct_option, points FROM answer_keys WHERE game_id = $1 ORDER BY idx",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn question_entry(
        &self,
        game_id: i64,
        idx: i32,
    ) -> Result<Option<QuestionEntry>, AppError> {
        let question = sqlx::query_as::<_, QuestionRow>(
            "SELECT idx, content, options FROM questions WHERE game_id = $1 AND idx = $2",
        )
        .bind(game_id)
        .bind(idx)
        .fetch_optional(&self.pool)
        .await?;

        let key = sqlx::query_as::<_, AnswerKeyRow>(
            "SELECT idx, correct_option, points FROM answer_keys WHERE game_id = $1 AND idx = $2",
        )
        .bind(game_id)
        .bind(idx)
        .fetch_optional(&self.pool)
        .await?;

        if question.is_none() && key.is_none() {
            return Ok(None);
        }

        let mut entry = QuestionEntry::blank();
        if let Some(q) = question {
            entry.content = q.content;
            entry.options = q.options.0;
        }
        if let Some(k) = key {
            entry.correct_option = k.correct_option.unwrap_or_default();
            entry.points = k.points;
        }
        Ok(Some(entry))
    }

    async fn save_question(
        &self,
        game_id: i64,
        idx: i32,
        entry: &QuestionEntry,
    ) -> Result<(), AppError> {
        let correct: Option<&str> = if entry.correct_option.is_empty() {
            None
        } else {
            Some(entry.correct_option.as_str())
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO questions (game_id, idx, content, options) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (game_id, idx) DO UPDATE SET content = EXCLUDED.content, options = EXCLUDED.options",
        )
        .bind(game_id)
        .bind(idx)
        .bind(&entry.content)
        .bind(Json(&entry.options))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO answer_keys (game_id, idx, correct_option, points) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (game_id, idx) DO UPDATE SET correct_option = EXCLUDED.correct_option, points = EXCLUDED.points",
        )
        .bind(game_id)
        .bind(idx)
        .bind(correct)
        .bind(entry.points)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn join_game(&self, game_id: i64, player: &PlayerRef) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO participants (game_id, address, nickname) VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING",
        )
        .bind(game_id)
        .bind(&player.address)
        .bind(&player.nickname)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "'{}' has already joined this game",
                player.nickname
            )));
        }

        // Seat accounting and the capacity check are one conditional write,
        // so simultaneous joiners cannot race past the limit.
        let bumped = sqlx::query(
            "UPDATE games SET current_participants = current_participants + 1 \
             WHERE id = $1 AND state = 'active' AND current_participants < max_participants",
        )
        .bind(game_id)
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            let game = sqlx::query_as::<_, Game>(&format!(
                "SELECT {GAME_COLUMNS} FROM games WHERE id = $1"
            ))
            .bind(game_id)
            .fetch_optional(&mut *tx)
            .await?;

            // The open transaction rolls back on drop; the insert is undone.
            return match game {
                None => Err(AppError::NotFound("Game not found".to_string())),
                Some(g) if g.state != GameState::Active => Err(AppError::InvalidState(
                    "Game is not accepting players".to_string(),
                )),
                Some(_) => Err(AppError::Capacity(
                    "Game has reached maximum participants".to_string(),
                )),
            };
        }

        tx.commit().await?;
        Ok(())
    }

    async fn leave_game(&self, game_id: i64, player: &PlayerRef) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM participants WHERE game_id = $1 AND address = $2 AND nickname = $3",
        )
        .bind(game_id)
        .bind(&player.address)
        .bind(&player.nickname)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() > 0 {
            sqlx::query(
                "UPDATE games SET current_participants = GREATEST(current_participants - 1, 0) \
                 WHERE id = $1",
            )
            .bind(game_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn participants(&self, game_id: i64) -> Result<Vec<Participant>, AppError> {
        let rows = sqlx::query_as::<_, Participant>(
            "SELECT address, nickname, answers, completed, points FROM participants \
             WHERE game_id = $1 ORDER BY nickname",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn participant(
        &self,
        game_id: i64,
        player: &PlayerRef,
    ) -> Result<Option<Participant>, AppError> {
        let row = sqlx::query_as::<_, Participant>(
            "SELECT address, nickname, answers, completed, points FROM participants \
             WHERE game_id = $1 AND address = $2 AND nickname = $3",
        )
        .bind(game_id)
        .bind(&player.address)
        .bind(&player.nickname)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn save_answers(
        &self,
        game_id: i64,
        player: &PlayerRef,
        answers: &[String],
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE participants SET answers = $4 \
             WHERE game_id = $1 AND address = $2 AND nickname = $3",
        )
        .bind(game_id)
        .bind(&player.address)
        .bind(&player.nickname)
        .bind(Json(answers))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Player not found".to_string()));
        }
        Ok(())
    }

    async fn mark_completed(&self, game_id: i64, player: &PlayerRef) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE participants SET completed = TRUE \
             WHERE game_id = $1 AND address = $2 AND nickname = $3",
        )
        .bind(game_id)
        .bind(&player.address)
        .bind(&player.nickname)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Player not found".to_string()));
        }
        Ok(())
    }

    async fn record_points(
        &self,
        game_id: i64,
        player: &PlayerRef,
        points: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE participants SET points = $4 \
             WHERE game_id = $1 AND address = $2 AND nickname = $3",
        )
        .bind(game_id)
        .bind(&player.address)
        .bind(&player.nickname)
        .bind(points)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Player not found".to_string()));
        }
        Ok(())
    }

    async fn leaderboard(&self, game_id: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
        let rows = sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT nickname, address, points FROM participants \
             WHERE game_id = $1 ORDER BY points DESC, nickname ASC",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn claim_reward_payout(&self, game_id: i64) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE games SET reward_paid = TRUE WHERE id = $1 AND reward_paid = FALSE")
                .bind(game_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_reward_claim(&self, game_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE games SET reward_paid = FALSE WHERE id = $1 AND reward_tx IS NULL")
            .bind(game_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_reward_payment(&self, game_id: i64, tx_ref: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE games SET reward_tx = $2, reward_paid = TRUE WHERE id = $1")
            .bind(game_id)
            .bind(tx_ref)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
