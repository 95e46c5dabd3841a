//! Commits classified windows to the public and protected sinks.

use std::fmt;

use futures::future::{join, try_join};

use crate::traits::{ExportSink, ObservationSink};
use crate::{AppError, CommitRetryConfig, DataProvider, ProcessedObservation};

/// Which store a commit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes records with bounded retries and reconciles incremental windows.
#[derive(Debug, Clone, Default)]
pub struct Persister {
    retry: CommitRetryConfig,
}

impl Persister {
    pub fn new(retry: CommitRetryConfig) -> Self {
        Self { retry }
    }

    /// Writes `records` to `sink`, retrying transient failures.
    ///
    /// After failed attempt `n` the persister sleeps `n * retry_base_delay`.
    /// Empty input is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CommitFailed` carrying the last error once all
    /// attempts are exhausted.
    pub async fn commit<S: ObservationSink>(
        &self,
        sink: &S,
        visibility: Visibility,
        records: &[ProcessedObservation],
        batch_id: &str,
    ) -> Result<usize, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match sink.add_many(records).await {
                Ok(count) => {
                    tracing::debug!(
                        sink = visibility.as_str(),
                        batch_id,
                        attempt,
                        count,
                        "Committed batch"
                    );
                    return Ok(count);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        sink = visibility.as_str(),
                        batch_id,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Commit failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        sink = visibility.as_str(),
                        batch_id,
                        attempts = attempt,
                        error = %e,
                        "Commit failed, giving up"
                    );
                    return Err(AppError::CommitFailed {
                        sink: visibility.as_str(),
                        batch_id: batch_id.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Commits both sets of a window concurrently.
    ///
    /// # Returns
    ///
    /// `(public_count, protected_count)`.
    pub async fn commit_window<S: ObservationSink>(
        &self,
        public_sink: &S,
        protected_sink: &S,
        public: &[ProcessedObservation],
        protected: &[ProcessedObservation],
        batch_id: &str,
    ) -> Result<(usize, usize), AppError> {
        try_join(
            self.commit(public_sink, Visibility::Public, public, batch_id),
            self.commit(protected_sink, Visibility::Protected, protected, batch_id),
        )
        .await
    }

    /// Deletes the provider's existing documents for `occurrence_ids` from
    /// both sinks.
    ///
    /// Run before an incremental window is committed so that a record whose
    /// visibility changed between harvests keeps a single live copy.
    pub async fn reconcile<S: ObservationSink>(
        &self,
        public_sink: &S,
        protected_sink: &S,
        provider: &DataProvider,
        occurrence_ids: &[String],
        batch_id: &str,
    ) -> Result<(), AppError> {
        if occurrence_ids.is_empty() {
            return Ok(());
        }

        let (public_ack, protected_ack) = try_join(
            public_sink.delete_by_occurrence_ids(provider, occurrence_ids),
            protected_sink.delete_by_occurrence_ids(provider, occurrence_ids),
        )
        .await?;

        if !(public_ack && protected_ack) {
            tracing::warn!(
                provider = %provider,
                batch_id,
                public_ack,
                protected_ack,
                count = occurrence_ids.len(),
                "Delete of stale observations was not acknowledged"
            );
        }
        Ok(())
    }

    /// Deletes all of a provider's documents from both sinks.
    ///
    /// Best-effort: failures are logged and reported as `false`.
    pub async fn purge<S: ObservationSink>(
        &self,
        public_sink: &S,
        protected_sink: &S,
        provider: &DataProvider,
    ) -> bool {
        let (public, protected) = join(
            public_sink.delete_provider_data(provider),
            protected_sink.delete_provider_data(provider),
        )
        .await;

        [(Visibility::Public, public), (Visibility::Protected, protected)]
            .into_iter()
            .fold(true, |acknowledged, (visibility, result)| match result {
                Ok(true) => acknowledged,
                Ok(false) => {
                    tracing::warn!(
                        provider = %provider,
                        sink = visibility.as_str(),
                        "Purge was not acknowledged"
                    );
                    false
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %provider,
                        sink = visibility.as_str(),
                        error = %e,
                        "Failed to purge provider data"
                    );
                    false
                }
            })
    }

    /// Appends committed public records to the provider's export artifact.
    ///
    /// Best-effort: the outcome never affects the commit.
    pub async fn export<X: ExportSink>(
        &self,
        export: &X,
        records: &[ProcessedObservation],
        provider: &DataProvider,
        batch_id: &str,
    ) {
        if records.is_empty() {
            return;
        }

        match export.append_observations(records, provider, batch_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(provider = %provider, batch_id, "Export of batch was not written");
            }
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    batch_id,
                    error = %e,
                    "Failed to export batch"
                );
            }
        }
    }
}
