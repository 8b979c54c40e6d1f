use anyhow::Context;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

/// Opens (creating if missing) the single database file.
pub async fn connect(path: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);
    let db = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("open database {path}"))?;
    info!(path, "database opened");
    Ok(db)
}

/// Ensures the `meals` and `dishes` tables exist. Safe to run on every start;
/// existing rows are left untouched.
pub async fn initialize(db: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meals (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            date            TEXT NOT NULL,
            total_calories  REAL NOT NULL CHECK (total_calories >= 0),
            total_protein_g REAL NOT NULL CHECK (total_protein_g >= 0),
            total_fat_g     REAL NOT NULL CHECK (total_fat_g >= 0),
            total_carbs_g   REAL NOT NULL CHECK (total_carbs_g >= 0),
            total_fiber_g   REAL NOT NULL CHECK (total_fiber_g >= 0)
        )
        "#,
    )
    .execute(db)
    .await
    .context("create meals table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dishes (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            meal_id          INTEGER NOT NULL REFERENCES meals (id),
            name             TEXT NOT NULL CHECK (length(trim(name)) > 0),
            estimated_weight REAL NOT NULL CHECK (estimated_weight >= 0),
            calories         REAL NOT NULL CHECK (calories >= 0),
            protein_g        REAL NOT NULL CHECK (protein_g >= 0),
            fat_g            REAL NOT NULL CHECK (fat_g >= 0),
            carbs_g          REAL NOT NULL CHECK (carbs_g >= 0),
            total_fiber_g    REAL NOT NULL CHECK (total_fiber_g >= 0)
        )
        "#,
    )
    .execute(db)
    .await
    .context("create dishes table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS dishes_meal_id_idx ON dishes (meal_id)")
        .execute(db)
        .await
        .context("create dishes index")?;

    Ok(())
}

/// Fresh in-memory database with the schema applied. A single connection keeps
/// every query on the same in-memory database.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    initialize(&db).await.unwrap();
    db
}
