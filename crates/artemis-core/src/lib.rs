//! Artemis Core - observation processing pipeline.
//!
//! Verbatim biodiversity records are transformed, split into public and
//! protected observations, and committed to two stores. Sensitive records
//! reach the public store only in diffused form and never while the
//! sighting is current.

pub mod admission;
pub mod config;
pub mod error;
pub mod geo;
pub mod models;
pub mod orchestrator;
pub mod persist;
pub mod processor;
pub mod progress;
pub mod quality;
pub mod sensitivity;
pub mod traits;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use config::{AdmissionConfig, CommitRetryConfig, DbConfig, LocationDefaults, ProcessConfig};
pub use error::AppError;
pub use geo::{CoordinateSystem, GeoPositioner, PositionInput};
pub use models::{
    AccessRightsKind, DataProvider, DiffusionStatus, Event, IdWindow, InvalidObservation,
    Location, Point, Polygon, ProcessMode, ProcessStats, ProcessedObservation, RunOutcome, Taxon,
    WindowResult,
};
pub use orchestrator::{ObservationSinks, id_windows};
pub use persist::{Persister, Visibility};
pub use processor::ObservationProcessor;
pub use progress::{ProcessEvent, ProgressReporter, SilentReporter, TracingReporter};
pub use quality::compute_data_quality_key;
pub use sensitivity::{ClassificationPolicy, ClassifiedBatch, Placement, classify};
