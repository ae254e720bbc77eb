//! Database pool creation.
//!
//! Compile-time database selection via feature flags. Unlike
//! `sqlx::AnyPool`, we use concrete pool types which allows full support
//! for `#[derive(FromRow)]` with custom types like enums and DateTime.
//!
//! - `sqlite` feature (default): `SqlitePool`
//! - `postgres` feature: `PgPool`

use tracing::info;

use crate::error::{DbError, Result};

/// Database pool type alias, selected by compiled feature.
#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub type DbPool = sqlx::PgPool;

#[cfg(feature = "sqlite")]
pub type DbPool = sqlx::SqlitePool;

/// Connect a pool and apply database-specific settings.
pub async fn connect_pool(url: &str, max_connections: u32) -> Result<DbPool> {
    #[cfg(feature = "sqlite")]
    {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        apply_sqlite_pragmas(&pool).await?;

        info!("Connected to database: {}", url);
        return Ok(pool);
    }

    #[cfg(all(feature = "postgres", not(feature = "sqlite")))]
    {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        info!("Connected to database: {}", url);
        return Ok(pool);
    }

    #[allow(unreachable_code)]
    Err(DbError::invalid_state(
        "no database backend compiled in; enable the 'sqlite' or 'postgres' feature",
    ))
}

/// WAL mode for concurrent gateway/worker access, NORMAL sync for speed.
#[cfg(feature = "sqlite")]
async fn apply_sqlite_pragmas(pool: &DbPool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL")
        .execute(pool)
        .await?;
    Ok(())
}
