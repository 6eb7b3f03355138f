use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::Config;
use crate::gateway::PaymentGateway;
use crate::session::SessionRegistry;
use crate::store::GameStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GameStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub sessions: SessionRegistry,
    pub config: Config,
}

impl FromRef<AppState> for Arc<dyn GameStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Arc<dyn PaymentGateway> {
    fn from_ref(state: &AppState) -> Self {
        state.gateway.clone()
    }
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
