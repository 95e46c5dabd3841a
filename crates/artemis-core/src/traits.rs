//! Trait definitions for the pipeline's collaborators.
//!
//! The processor is generic over these traits so that source readers,
//! factories, stores and the diffusion algorithm can be swapped without
//! touching the control flow:
//!
//! - **Testability**: in-memory implementations drive the integration tests
//! - **Flexibility**: one sink type serves both the public and the protected store
//! - **Decoupling**: the pipeline never sees a concrete record schema or store
//!
//! # Example
//!
//! ```
//! use artemis_core::traits::ObservationSink;
//! use artemis_core::{AppError, DataProvider, ProcessedObservation};
//!
//! // Business logic uses traits, not concrete types
//! async fn replace<S: ObservationSink>(
//!     sink: &S,
//!     provider: &DataProvider,
//!     records: &[ProcessedObservation],
//! ) -> Result<usize, AppError> {
//!     let ids: Vec<String> = records.iter().map(|r| r.occurrence_id.clone()).collect();
//!     sink.delete_by_occurrence_ids(provider, &ids).await?;
//!     sink.add_many(records).await
//! }
//! ```

use std::future::Future;

use crate::{AppError, DataProvider, InvalidObservation, ProcessedObservation};

/// Reader of verbatim records for a provider.
///
/// Records are addressed by a monotonically increasing integer id.
pub trait VerbatimSource: Send + Sync {
    /// Raw record type handed to the factory.
    type Record: Send + Sync + 'static;

    /// Returns the highest verbatim id stored for the provider (0 when empty).
    fn get_max_id(
        &self,
        provider: &DataProvider,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Fetches records with ids in `[start_id, end_id]`.
    ///
    /// # Arguments
    ///
    /// * `provider` - The provider being processed
    /// * `start_id` - First id of the window (inclusive)
    /// * `end_id` - Last id of the window (inclusive)
    fn get_batch(
        &self,
        provider: &DataProvider,
        start_id: i64,
        end_id: i64,
    ) -> impl Future<Output = Result<Vec<Self::Record>, AppError>> + Send;
}

/// Converts verbatim records into processed observations.
///
/// Called from a rayon worker; implementations must be CPU-only.
pub trait ObservationFactory: Send + Sync {
    type Verbatim: Send + Sync + 'static;

    /// Transforms a record, or returns `None` when it cannot be converted.
    ///
    /// With `diffuse` set the factory produces the record intended for public
    /// release; a provider that delivers pre-diffused data reports it through
    /// `DiffusionStatus::DiffusedByProvider`.
    fn transform(&self, verbatim: &Self::Verbatim, diffuse: bool) -> Option<ProcessedObservation>;
}

/// Geographic generalization of protected records.
pub trait DiffusionService: Send + Sync {
    /// Generalizes the observation's location in place.
    fn diffuse(&self, observation: &mut ProcessedObservation);
}

/// Validation of processed observations.
pub trait ValidationService: Send + Sync {
    /// Removes invalid observations from `observations` and returns them.
    fn validate(
        &self,
        observations: &mut Vec<ProcessedObservation>,
        provider: &DataProvider,
    ) -> Vec<InvalidObservation>;

    /// Stores rejected observations for later inspection.
    fn record_invalid(
        &self,
        invalid: Vec<InvalidObservation>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Store for processed observations of one visibility (public or protected).
pub trait ObservationSink: Send + Sync {
    /// Inserts the records and returns how many were written.
    fn add_many(
        &self,
        records: &[ProcessedObservation],
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Deletes the provider's documents whose occurrence id is listed.
    ///
    /// Occurrence ids are unique per provider only; documents of other
    /// providers must be left alone.
    ///
    /// # Returns
    ///
    /// true if the delete was acknowledged by the store.
    fn delete_by_occurrence_ids(
        &self,
        provider: &DataProvider,
        occurrence_ids: &[String],
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Deletes every document harvested from the provider.
    fn delete_provider_data(
        &self,
        provider: &DataProvider,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Largest number of documents the store accepts per write.
    fn max_write_batch_size(&self) -> usize;
}

/// Best-effort export of committed public records.
pub trait ExportSink: Send + Sync {
    /// Appends records to the provider's export artifact.
    ///
    /// # Returns
    ///
    /// true if the records were written.
    fn append_observations(
        &self,
        records: &[ProcessedObservation],
        provider: &DataProvider,
        batch_id: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}
