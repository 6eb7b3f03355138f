// src/reveal.rs

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time;

use crate::{
    config::{PAYOUT_DELAY_SECS, REVEAL_STEP_SECS},
    error::AppError,
    gateway::PaymentGateway,
    models::{game::Game, participant::LeaderboardEntry},
    store::GameStore,
};

/// Pacing of the reveal. Injected so tests can run it under a paused
/// clock and deployments can tune it through the environment.
#[derive(Debug, Clone, Copy)]
pub struct RevealConfig {
    pub step: Duration,
    pub payout_delay: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(REVEAL_STEP_SECS),
            payout_delay: Duration::from_secs(PAYOUT_DELAY_SECS),
        }
    }
}

/// What the sequencer emits, in order: one `Row` per participant from
/// last place up to first, then the payout resolution, then `Complete`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevealEvent {
    Row {
        /// 0-based rank; 0 is the winner.
        rank: usize,
        entry: LeaderboardEntry,
    },
    Payout {
        tx_ref: String,
        /// True when a previous reveal already settled the reward and
        /// this run only surfaces the stored reference.
        already_paid: bool,
    },
    PayoutFailed {
        reason: String,
    },
    /// All rows are revealed and the payout step has resolved.
    Complete,
}

/// Timed, rank-descending disclosure of one game's leaderboard, with the
/// reward settled exactly once after the winner is revealed.
pub struct RevealSequencer {
    store: Arc<dyn GameStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: RevealConfig,
}

impl RevealSequencer {
    pub fn new(
        store: Arc<dyn GameStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: RevealConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Runs the reveal to completion, pushing events into `events`.
    /// A dropped receiver stops nothing; the payout still settles.
    pub async fn run(
        self,
        game: Game,
        events: mpsc::Sender<RevealEvent>,
    ) -> Result<(), AppError> {
        let board = self.store.leaderboard(game.id).await?;

        for rank in (0..board.len()).rev() {
            time::sleep(self.config.step).await;
            let _ = events
                .send(RevealEvent::Row {
                    rank,
                    entry: board[rank].clone(),
                })
                .await;
        }

        if let Some(winner) = board.first() {
            time::sleep(self.config.payout_delay).await;
            let resolution = self.settle(&game, winner).await?;
            let _ = events.send(resolution).await;
        }

        let _ = events.send(RevealEvent::Complete).await;
        Ok(())
    }

    /// Resolves the reward for the top entry. The gateway is only called
    /// by the caller that wins the conditional flip of `reward_paid`, so
    /// a reloaded leaderboard (or a concurrent one) cannot pay twice.
    async fn settle(
        &self,
        game: &Game,
        winner: &LeaderboardEntry,
    ) -> Result<RevealEvent, AppError> {
        let current = self
            .store
            .game_by_id(game.id)
            .await?
            .ok_or(AppError::NotFound("Game not found".to_string()))?;

        if current.reward_paid {
            return Ok(RevealEvent::Payout {
                tx_ref: current.reward_tx.unwrap_or_default(),
                already_paid: true,
            });
        }

        let Some(lock_ref) = current.lock_tx.clone() else {
            return Ok(RevealEvent::PayoutFailed {
                reason: "no locked reward on record for this game".to_string(),
            });
        };

        if !self.store.claim_reward_payout(game.id).await? {
            // Lost the flip to another reveal; show whatever it recorded.
            let after = self.store.game_by_id(game.id).await?;
            return Ok(RevealEvent::Payout {
                tx_ref: after.and_then(|g| g.reward_tx).unwrap_or_default(),
                already_paid: true,
            });
        }

        match self
            .gateway
            .pay_winner(&lock_ref, current.reward_amount, &winner.address)
            .await
        {
            Ok(tx_ref) => {
                self.store.record_reward_payment(game.id, &tx_ref).await?;
                tracing::info!(
                    "Paid {} to {} for game {} at {}",
                    current.reward_amount,
                    winner.nickname,
                    game.id,
                    tx_ref
                );
                Ok(RevealEvent::Payout {
                    tx_ref,
                    already_paid: false,
                })
            }
            Err(e) => {
                // Give the claim back so a later reveal can retry.
                if let Err(release_err) = self.store.release_reward_claim(game.id).await {
                    tracing::warn!(
                        "Failed to release payout claim for game {}: {}",
                        game.id,
                        release_err
                    );
                }
                tracing::error!("Payout failed for game {}: {}", game.id, e);
                Ok(RevealEvent::PayoutFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}
