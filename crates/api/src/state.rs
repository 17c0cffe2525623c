//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;
use tradeyard_billing::BillingService;

use crate::auth::JwtManager;
use crate::config::Config;

/// Shared state available to all request handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub billing: Arc<BillingService>,
    pub jwt: JwtManager,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool, billing: BillingService) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        Self {
            config: Arc::new(config),
            pool,
            billing: Arc::new(billing),
            jwt,
        }
    }
}
