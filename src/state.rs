use std::sync::Arc;

use sqlx::SqlitePool;
use time::UtcOffset;

use crate::config::AppConfig;
use crate::db;
use crate::nutrition::{GeminiClient, NutritionEstimator};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub estimator: Arc<dyn NutritionEstimator>,
    pub history_offset: UtcOffset,
}

impl AppState {
    /// Reads configuration, opens the database and ensures the schema exists.
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let db = db::connect(&config.database_path).await?;
        db::initialize(&db).await?;

        let estimator = Arc::new(GeminiClient::new(&config.gemini)?) as Arc<dyn NutritionEstimator>;

        Ok(Self::from_parts(db, estimator, config.history_offset))
    }

    pub fn from_parts(
        db: SqlitePool,
        estimator: Arc<dyn NutritionEstimator>,
        history_offset: UtcOffset,
    ) -> Self {
        Self {
            db,
            estimator,
            history_offset,
        }
    }
}
