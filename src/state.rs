//! Shared application state for all routes.

use crate::auth::TokenService;
use crate::config::{ResolvedModel, Settings};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub model: Arc<ResolvedModel>,
    pub tokens: Arc<TokenService>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(pool: PgPool, model: ResolvedModel, settings: Settings) -> Self {
        let tokens = TokenService::new(&settings.jwt_secret, settings.token_ttl_secs);
        AppState {
            pool,
            model: Arc::new(model),
            tokens: Arc::new(tokens),
            settings: Arc::new(settings),
        }
    }
}
