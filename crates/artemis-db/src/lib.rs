//! Artemis DB - PostgreSQL observation sinks and file export.

pub mod export;
pub mod repository;

pub use export::JsonlExportSink;
pub use repository::{ObservationRepository, ObservationTable};

use artemis_core::{AppError, DbConfig};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

/// Schema for both observation tables.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Opens a pool and brings the schema up to date.
///
/// # Errors
///
/// Returns `AppError::DatabaseError` if the connection fails and
/// `AppError::Generic` if a migration cannot be applied.
pub async fn connect(database_url: &str, config: &DbConfig) -> Result<PgPool, AppError> {
    tracing::info!(max_connections = config.max_connections, "Connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::Generic(format!("Migration failed: {e}")))?;

    Ok(pool)
}
