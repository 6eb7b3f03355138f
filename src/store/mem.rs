// src/store/mem.rs

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sqlx::types::Json;

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

/// In-memory implementation of [`GameStore`], used by the test suite and
/// for running the service locally without Postgres. Mirrors the
/// conditional-write semantics of the Postgres store.
#[derive(Default)]
pub struct MemGameStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    games: Vec<GameRec>,
}

struct GameRec {
    game: Game,
    questions: BTreeMap<i32, (String, Vec<String>)>,
    keys: BTreeMap<i32, (Option<String>, i64)>,
    players: Vec<Participant>,
}

impl MemGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    fn rec(&self, game_id: i64) -> Result<&GameRec, AppError> {
        self.games
            .iter()
            .find(|r| r.game.id == game_id)
            .ok_or(AppError::NotFound("Game not found".to_string()))
    }

    fn rec_mut(&mut self, game_id: i64) -> Result<&mut GameRec, AppError> {
        self.games
            .iter_mut()
            .find(|r| r.game.id == game_id)
            .ok_or(AppError::NotFound("Game not found".to_string()))
    }
}

#[async_trait]
impl GameStore for MemGameStore {
    async fn create_game(&self, new: NewGame) -> Result<Game, AppError> {
        let mut inner = self.lock();

        if inner
            .games
            .iter()
            .any(|r| r.game.passcode == new.passcode && r.game.state != GameState::Ended)
        {
            return Err(AppError::Conflict(
                "Passcode was taken concurrently".to_string(),
            ));
        }

        inner.next_id += 1;
        let game = Game {
            id: inner.next_id,
            owner: new.owner,
            title: new.title,
            passcode: new.passcode,
            reward_amount: new.reward_amount,
            question_count: new.question_count,
            duration_minutes: new.duration_minutes,
            max_participants: MAX_PARTICIPANTS,
            current_participants: 0,
            state: GameState::Draft,
            lock_tx: None,
            reward_tx: None,
            reward_paid: false,
            created_at: Some(chrono::Utc::now()),
        };

        inner.games.push(GameRec {
            game: game.clone(),
            questions: BTreeMap::new(),
            keys: BTreeMap::new(),
            players: Vec::new(),
        });

        Ok(game)
    }

    async fn passcode_in_use(&self, passcode: i32) -> Result<bool, AppError> {
        let inner = self.lock();
        Ok(inner
            .games
            .iter()
            .any(|r| r.game.passcode == passcode && r.game.state != GameState::Ended))
    }

    async fn game_by_passcode(&self, passcode: i32) -> Result<Option<Game>, AppError> {
        let inner = self.lock();

        let live = inner
            .games
            .iter()
            .find(|r| r.game.passcode == passcode && r.game.state != GameState::Ended);
        if let Some(rec) = live {
            return Ok(Some(rec.game.clone()));
        }

        Ok(inner
            .games
            .iter()
            .filter(|r| r.game.passcode == passcode)
            .max_by_key(|r| r.game.id)
            .map(|r| r.game.clone()))
    }

    async fn game_by_id(&self, id: i64) -> Result<Option<Game>, AppError> {
        let inner = self.lock();
        Ok(inner
            .games
            .iter()
            .find(|r| r.game.id == id)
            .map(|r| r.game.clone()))
    }

    async fn games_by_owner(&self, owner: &str) -> Result<Vec<Game>, AppError> {
        let inner = self.lock();
        Ok(inner
            .games
            .iter()
            .filter(|r| r.game.owner == owner)
            .map(|r| r.game.clone())
            .collect())
    }

    async fn update_game(&self, id: i64, changes: &UpdateGameRequest) -> Result<Game, AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(id)?;

        if let Some(title) = &changes.title {
            rec.game.title = title.clone();
        }
        if let Some(reward_amount) = changes.reward_amount {
            rec.game.reward_amount = reward_amount;
        }
        if let Some(duration_minutes) = changes.duration_minutes {
            rec.game.duration_minutes = duration_minutes;
        }

        Ok(rec.game.clone())
    }

    async fn delete_game(&self, id: i64) -> Result<(), AppError> {
        let mut inner = self.lock();
        let before = inner.games.len();
        inner.games.retain(|r| r.game.id != id);
        if inner.games.len() == before {
            return Err(AppError::NotFound("Game not found".to_string()));
        }
        Ok(())
    }

    async fn set_state(&self, game_id: i64, state: GameState) -> Result<(), AppError> {
        let mut inner = self.lock();
        inner.rec_mut(game_id)?.game.state = state;
        Ok(())
    }

    async fn reset_participants(&self, game_id: i64) -> Result<(), AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;
        rec.players.clear();
        rec.game.current_participants = 0;
        rec.game.reward_paid = false;
        rec.game.reward_tx = None;
        Ok(())
    }

    async fn record_lock(&self, game_id: i64, tx_ref: &str) -> Result<(), AppError> {
        let mut inner = self.lock();
        inner.rec_mut(game_id)?.game.lock_tx = Some(tx_ref.to_string());
        Ok(())
    }

    async fn question_rows(&self, game_id: i64) -> Result<Vec<QuestionRow>, AppError> {
        let inner = self.lock();
        let rec = inner.rec(game_id)?;
        Ok(rec
            .questions
            .iter()
            .map(|(idx, (content, options))| QuestionRow {
                idx: *idx,
                content: content.clone(),
                options: Json(options.clone()),
            })
            .collect())
    }

    async fn answer_key(&self, game_id: i64) -> Result<Vec<AnswerKeyRow>, AppError> {
        let inner = self.lock();
        let rec = inner.rec(game_id)?;
        Ok(rec
            .keys
            .iter()
            .map(|(idx, (correct, points))| AnswerKeyRow {
                idx: *idx,
                correct_option: correct.clone(),
                points: *points,
            })
            .collect())
    }

    async fn question_entry(
        &self,
        game_id: i64,
        idx: i32,
    ) -> Result<Option<QuestionEntry>, AppError> {
        let inner = self.lock();
        let rec = inner.rec(game_id)?;

        let question = rec.questions.get(&idx);
        let key = rec.keys.get(&idx);
        if question.is_none() && key.is_none() {
            return Ok(None);
        }

        let mut entry = QuestionEntry::blank();
        if let Some((content, options)) = question {
            entry.content = content.clone();
            entry.options = options.clone();
        }
        if let Some((correct, points)) = key {
            entry.correct_option = correct.clone().unwrap_or_default();
            entry.points = *points;
        }
        Ok(Some(entry))
    }

    async fn save_question(
        &self,
        game_id: i64,
        idx: i32,
        entry: &QuestionEntry,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;

        let correct = if entry.correct_option.is_empty() {
            None
        } else {
            Some(entry.correct_option.clone())
        };

        rec.questions
            .insert(idx, (entry.content.clone(), entry.options.clone()));
        rec.keys.insert(idx, (correct, entry.points));
        Ok(())
    }

    async fn join_game(&self, game_id: i64, player: &PlayerRef) -> Result<(), AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;

        if rec
            .players
            .iter()
            .any(|p| p.address == player.address && p.nickname == player.nickname)
        {
            return Err(AppError::Conflict(format!(
                "'{}' has already joined this game",
                player.nickname
            )));
        }

        if rec.game.state != GameState::Active {
            return Err(AppError::InvalidState(
                "Game is not accepting players".to_string(),
            ));
        }

        if rec.game.current_participants >= rec.game.max_participants {
            return Err(AppError::Capacity(
                "Game has reached maximum participants".to_string(),
            ));
        }

        rec.players.push(Participant {
            address: player.address.clone(),
            nickname: player.nickname.clone(),
            answers: Json(Vec::new()),
            completed: false,
            points: 0,
        });
        rec.game.current_participants += 1;
        Ok(())
    }

    async fn leave_game(&self, game_id: i64, player: &PlayerRef) -> Result<(), AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;

        let before = rec.players.len();
        rec.players
            .retain(|p| !(p.address == player.address && p.nickname == player.nickname));
        if rec.players.len() < before {
            rec.game.current_participants = (rec.game.current_participants - 1).max(0);
        }
        Ok(())
    }

    async fn participants(&self, game_id: i64) -> Result<Vec<Participant>, AppError> {
        let inner = self.lock();
        let rec = inner.rec(game_id)?;
        let mut players = rec.players.clone();
        players.sort_by(|a, b| a.nickname.cmp(&b.nickname));
        Ok(players)
    }

    async fn participant(
        &self,
        game_id: i64,
        player: &PlayerRef,
    ) -> Result<Option<Participant>, AppError> {
        let inner = self.lock();
        let rec = inner.rec(game_id)?;
        Ok(rec
            .players
            .iter()
            .find(|p| p.address == player.address && p.nickname == player.nickname)
            .cloned())
    }

    async fn save_answers(
        &self,
        game_id: i64,
        player: &PlayerRef,
        answers: &[String],
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;
        let row = rec
            .players
            .iter_mut()
            .find(|p| p.address == player.address && p.nickname == player.nickname)
            .ok_or(AppError::NotFound("Player not found".to_string()))?;
        row.answers = Json(answers.to_vec());
        Ok(())
    }

    async fn mark_completed(&self, game_id: i64, player: &PlayerRef) -> Result<(), AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;
        let row = rec
            .players
            .iter_mut()
            .find(|p| p.address == player.address && p.nickname == player.nickname)
            .ok_or(AppError::NotFound("Player not found".to_string()))?;
        row.completed = true;
        Ok(())
    }

    async fn record_points(
        &self,
        game_id: i64,
        player: &PlayerRef,
        points: i64,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;
        let row = rec
            .players
            .iter_mut()
            .find(|p| p.address == player.address && p.nickname == player.nickname)
            .ok_or(AppError::NotFound("Player not found".to_string()))?;
        row.points = points;
        Ok(())
    }

    async fn leaderboard(&self, game_id: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
        let inner = self.lock();
        let rec = inner.rec(game_id)?;
        let mut entries: Vec<LeaderboardEntry> = rec
            .players
            .iter()
            .map(|p| LeaderboardEntry {
                nickname: p.nickname.clone(),
                address: p.address.clone(),
                points: p.points,
            })
            .collect();
        entries.sort_by(|a, b| b.points.cmp(&a.points).then(a.nickname.cmp(&b.nickname)));
        Ok(entries)
    }

    async fn claim_reward_payout(&self, game_id: i64) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;
        if rec.game.reward_paid {
            return Ok(false);
        }
        rec.game.reward_paid = true;
        Ok(true)
    }

    async fn release_reward_claim(&self, game_id: i64) -> Result<(), AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;
        if rec.game.reward_tx.is_none() {
            rec.game.reward_paid = false;
        }
        Ok(())
    }

    async fn record_reward_payment(&self, game_id: i64, tx_ref: &str) -> Result<(), AppError> {
        let mut inner = self.lock();
        let rec = inner.rec_mut(game_id)?;
        rec.game.reward_tx = Some(tx_ref.to_string());
        rec.game.reward_paid = true;
        Ok(())
    }
}
