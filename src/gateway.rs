// src/gateway.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Escrow service holding the prize pool. Funds are locked when a game is
/// activated and released to the winner's address during the leaderboard
/// reveal. Transaction construction and signing happen entirely on the
/// gateway side; this service only keeps the returned references.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Locks `amount` and returns a reference to the lock transaction.
    async fn lock_funds(&self, amount: i64) -> Result<String, AppError>;

    /// Releases the locked funds to `recipient`, returning a reference to
    /// the payout transaction.
    async fn pay_winner(
        &self,
        lock_ref: &str,
        amount: i64,
        recipient: &str,
    ) -> Result<String, AppError>;
}

#[derive(Serialize)]
struct LockRequest {
    amount: i64,
}

#[derive(Serialize)]
struct PayoutRequest<'a> {
    lock_ref: &'a str,
    amount: i64,
    recipient: &'a str,
}

#[derive(Deserialize)]
struct TxResponse {
    tx_ref: String,
}

/// HTTP client for the payment gateway.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<TxResponse, AppError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("gateway unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Payment(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Payment(format!("malformed gateway response: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn lock_funds(&self, amount: i64) -> Result<String, AppError> {
        let response = self.post("lock", &LockRequest { amount }).await?;
        tracing::info!("Locked reward of {} at {}", amount, response.tx_ref);
        Ok(response.tx_ref)
    }

    async fn pay_winner(
        &self,
        lock_ref: &str,
        amount: i64,
        recipient: &str,
    ) -> Result<String, AppError> {
        let response = self
            .post(
                "payouts",
                &PayoutRequest {
                    lock_ref,
                    amount,
                    recipient,
                },
            )
            .await?;
        tracing::info!("Reward payment completed: {}", response.tx_ref);
        Ok(response.tx_ref)
    }
}
