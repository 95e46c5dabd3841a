use artemis_core::error::AppError;
use artemis_core::models::{DataProvider, ProcessedObservation};
use artemis_core::traits::ObservationSink;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres, QueryBuilder};

/// Default number of documents written per statement.
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 1000;

/// Which table a repository writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationTable {
    Public,
    Protected,
}

impl ObservationTable {
    pub fn name(&self) -> &'static str {
        match self {
            ObservationTable::Public => "observations",
            ObservationTable::Protected => "protected_observations",
        }
    }
}

/// Repository for processed observation documents in PostgreSQL.
///
/// One instance serves one table; a processor is given a public and a
/// protected repository sharing the same pool.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use artemis_db::{ObservationRepository, ObservationTable};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/artemis")
///     .await?;
///
/// let public = ObservationRepository::new(pool.clone(), ObservationTable::Public);
/// let protected = ObservationRepository::new(pool, ObservationTable::Protected);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ObservationRepository {
    pool: Pool<Postgres>,
    table: ObservationTable,
    write_batch_size: usize,
}

impl ObservationRepository {
    /// Creates a repository over `table` using the given pool.
    pub fn new(pool: PgPool, table: ObservationTable) -> Self {
        Self {
            pool,
            table,
            write_batch_size: DEFAULT_WRITE_BATCH_SIZE,
        }
    }

    /// Sets how many documents go into one insert statement.
    pub fn with_write_batch_size(mut self, size: usize) -> Self {
        self.write_batch_size = size.max(1);
        self
    }

    pub fn table(&self) -> ObservationTable {
        self.table
    }

    /// Inserts documents in one transaction.
    ///
    /// Documents are written in statements of at most `write_batch_size`
    /// rows; either every statement commits or none does.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SerializationError` if a document cannot be encoded
    /// and `AppError::DatabaseError` if the database operation fails.
    pub async fn insert_many(&self, records: &[ProcessedObservation]) -> Result<usize, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let rows = records
            .iter()
            .map(|record| {
                Ok(DocumentRow {
                    data_provider_id: record.data_provider_id,
                    occurrence_id: record.occurrence_id.clone(),
                    document: serde_json::to_value(record)?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(self.write_batch_size) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (data_provider_id, occurrence_id, document, inserted_at) ",
                self.table.name()
            ));
            builder.push_values(chunk, |mut row, doc| {
                row.push_bind(doc.data_provider_id)
                    .push_bind(doc.occurrence_id.clone())
                    .push_bind(Json(doc.document.clone()))
                    .push("NOW()");
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(rows.len())
    }

    /// Deletes the provider's documents whose occurrence id is listed.
    ///
    /// Occurrence ids are only unique within a provider, so the delete is
    /// scoped to `provider_id`.
    ///
    /// # Returns
    ///
    /// The number of deleted rows.
    pub async fn delete_occurrences(
        &self,
        provider_id: i32,
        occurrence_ids: &[String],
    ) -> Result<u64, AppError> {
        if occurrence_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(&delete_occurrences_sql(self.table))
            .bind(provider_id)
            .bind(occurrence_ids)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected())
    }

    /// Deletes every document of a provider.
    ///
    /// # Returns
    ///
    /// The number of deleted rows.
    pub async fn delete_for_provider(&self, provider_id: i32) -> Result<u64, AppError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE data_provider_id = $1",
            self.table.name()
        ))
        .bind(provider_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected())
    }
}

fn delete_occurrences_sql(table: ObservationTable) -> String {
    format!(
        "DELETE FROM {} WHERE data_provider_id = $1 AND occurrence_id = ANY($2)",
        table.name()
    )
}

impl ObservationSink for ObservationRepository {
    async fn add_many(&self, records: &[ProcessedObservation]) -> Result<usize, AppError> {
        self.insert_many(records).await
    }

    async fn delete_by_occurrence_ids(
        &self,
        provider: &DataProvider,
        occurrence_ids: &[String],
    ) -> Result<bool, AppError> {
        let deleted = self.delete_occurrences(provider.id, occurrence_ids).await?;
        tracing::debug!(
            table = self.table.name(),
            provider = %provider,
            requested = occurrence_ids.len(),
            deleted,
            "Deleted stale observations"
        );
        Ok(true)
    }

    async fn delete_provider_data(&self, provider: &DataProvider) -> Result<bool, AppError> {
        let deleted = self.delete_for_provider(provider.id).await?;
        tracing::info!(
            table = self.table.name(),
            provider = %provider,
            deleted,
            "Deleted provider observations"
        );
        Ok(true)
    }

    fn max_write_batch_size(&self) -> usize {
        self.write_batch_size
    }
}

struct DocumentRow {
    data_provider_id: i32,
    occurrence_id: String,
    document: serde_json::Value,
}
