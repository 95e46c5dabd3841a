//! Domain types shared by the pipeline and its collaborators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source system an observation was harvested from.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProvider {
    pub id: i32,
    /// Stable identifier used in logs, batch ids and export file names.
    pub identifier: String,
    pub name: String,
    /// Uncertainty substituted when a record carries none (meters).
    pub coordinate_uncertainty_in_meters: i32,
}

impl DataProvider {
    pub fn new(id: i32, identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            name: name.into(),
            coordinate_uncertainty_in_meters: 5000,
        }
    }

    pub fn with_coordinate_uncertainty(mut self, meters: i32) -> Self {
        self.coordinate_uncertainty_in_meters = meters;
        self
    }
}

impl fmt::Display for DataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.id, self.identifier)
    }
}

/// Full runs purge and rewrite a provider; incremental runs reconcile in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessMode {
    Full,
    Incremental,
}

impl ProcessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessMode::Full => "full",
            ProcessMode::Incremental => "incremental",
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, ProcessMode::Full)
    }
}

/// Contiguous inclusive range of verbatim ids fetched as one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdWindow {
    pub start_id: i64,
    pub end_id: i64,
}

impl IdWindow {
    pub fn len(&self) -> usize {
        (self.end_id - self.start_id + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end_id < self.start_id
    }

    /// Batch id used by the persister and the export side-channel.
    pub fn batch_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for IdWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_id, self.end_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessRightsKind {
    FreeUsage,
    NotForPublicUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffusionStatus {
    #[default]
    NotDiffused,
    DiffusedBySystem,
    DiffusedByProvider,
}

/// WGS84 position, `x` = longitude and `y` = latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Single closed ring; the first and last coordinates are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub decimal_longitude: Option<f64>,
    pub decimal_latitude: Option<f64>,
    pub point: Option<Point>,
    pub point_with_buffer: Option<Polygon>,
    pub point_with_disturbance_buffer: Option<Polygon>,
    pub coordinate_uncertainty_in_meters: Option<i32>,
    /// EPSG tag of the source reference system.
    pub geodetic_datum: Option<String>,
    pub verbatim_longitude: Option<String>,
    pub verbatim_latitude: Option<String>,
    pub verbatim_coordinate_system: Option<String>,
    pub continent: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: i32,
    pub scientific_name: Option<String>,
    /// Radius around a sighting where disturbance harms the species (meters).
    pub disturbance_radius: Option<i32>,
}

/// Transformed, normalized observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedObservation {
    pub data_provider_id: i32,
    pub occurrence_id: String,
    pub sensitivity_category: i32,
    pub access_rights: Option<AccessRightsKind>,
    pub protected: bool,
    pub sensitive: bool,
    pub diffusion_status: DiffusionStatus,
    pub location: Option<Location>,
    pub event: Option<Event>,
    pub taxon: Option<Taxon>,
    pub data_quality_key: Option<String>,
}

impl ProcessedObservation {
    pub fn new(data_provider_id: i32, occurrence_id: impl Into<String>) -> Self {
        Self {
            data_provider_id,
            occurrence_id: occurrence_id.into(),
            sensitivity_category: 1,
            access_rights: None,
            protected: false,
            sensitive: false,
            diffusion_status: DiffusionStatus::NotDiffused,
            location: None,
            event: None,
            taxon: None,
            data_quality_key: None,
        }
    }
}

/// Observation rejected by the validation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidObservation {
    pub data_provider_id: i32,
    pub occurrence_id: String,
    pub defects: Vec<String>,
}

/// Counts committed by a single window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowResult {
    pub window: IdWindow,
    pub public_count: usize,
    pub protected_count: usize,
}

/// Aggregated counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub public_count: usize,
    pub protected_count: usize,
    pub windows: usize,
}

impl ProcessStats {
    pub fn add(&mut self, result: &WindowResult) {
        self.public_count += result.public_count;
        self.protected_count += result.protected_count;
        self.windows += 1;
    }

    pub fn total(&self) -> usize {
        self.public_count + self.protected_count
    }
}

/// Terminal state of a run, produced exactly once by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success {
        provider_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        public_count: usize,
        protected_count: usize,
    },
    Cancelled {
        provider_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Failed {
        provider_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl RunOutcome {
    pub fn provider_id(&self) -> i32 {
        match self {
            RunOutcome::Success { provider_id, .. }
            | RunOutcome::Cancelled { provider_id, .. }
            | RunOutcome::Failed { provider_id, .. } => *provider_id,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::Success { .. } => "succeeded",
            RunOutcome::Cancelled { .. } => "cancelled",
            RunOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_display_is_batch_id() {
        let window = IdWindow {
            start_id: 1001,
            end_id: 2000,
        };
        assert_eq!(window.batch_id(), "1001-2000");
        assert_eq!(window.len(), 1000);
    }

    #[test]
    fn test_provider_display() {
        let provider = DataProvider::new(7, "artportalen", "Artportalen");
        assert_eq!(provider.to_string(), "7-artportalen");
        assert_eq!(provider.coordinate_uncertainty_in_meters, 5000);
    }

    #[test]
    fn test_stats_accumulate_windows() {
        let mut stats = ProcessStats::default();
        let window = IdWindow {
            start_id: 1,
            end_id: 40,
        };
        stats.add(&WindowResult {
            window,
            public_count: 30,
            protected_count: 10,
        });
        stats.add(&WindowResult {
            window,
            public_count: 5,
            protected_count: 0,
        });
        assert_eq!(stats.public_count, 35);
        assert_eq!(stats.protected_count, 10);
        assert_eq!(stats.windows, 2);
        assert_eq!(stats.total(), 45);
    }

    #[test]
    fn test_observation_serializes_to_json() {
        let obs = ProcessedObservation::new(1, "urn:occ:1");
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["occurrence_id"], "urn:occ:1");
        assert_eq!(json["diffusion_status"], "NotDiffused");
    }
}
