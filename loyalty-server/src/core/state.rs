//! Shared Application State

use sqlx::SqlitePool;

use crate::core::Config;
use crate::db::DbService;
use crate::loyalty::CardEngine;
use crate::points::PointsEngine;
use crate::utils::AppError;

/// Cloneable handle to everything the handlers need
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub pool: SqlitePool,
    pub card_engine: CardEngine,
    pub points_engine: PointsEngine,
}

impl ServerState {
    /// Open the database under the configured work dir, run
    /// migrations, and wire up the engines
    pub async fn initialize(config: &Config) -> Result<Self, AppError> {
        std::fs::create_dir_all(&config.work_dir)
            .map_err(|e| AppError::Internal(format!("Failed to create work dir: {e}")))?;
        let db = DbService::new(&config.db_path()).await?;
        Ok(Self::from_pool(config.clone(), db.pool))
    }

    /// In-memory state for tests
    pub async fn in_memory() -> Result<Self, AppError> {
        let db = DbService::new_in_memory().await?;
        Ok(Self::from_pool(Config::from_env(), db.pool))
    }

    fn from_pool(config: Config, pool: SqlitePool) -> Self {
        let card_engine = CardEngine::new(pool.clone());
        let points_engine = PointsEngine::new(pool.clone());
        Self {
            config,
            pool,
            card_engine,
            points_engine,
        }
    }
}
