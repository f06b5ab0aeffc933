use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    ai::provider::AiProvider,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    realtime::rooms::Rooms,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub ai: Arc<dyn AiProvider>,
    pub rooms: Rooms,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, ai: Arc<dyn AiProvider>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            ai,
            rooms: Rooms::default(),
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
