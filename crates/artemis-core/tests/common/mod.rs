//! In-memory collaborators for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use artemis_core::traits::{
    DiffusionService, ExportSink, ObservationFactory, ObservationSink, ValidationService,
    VerbatimSource,
};
use artemis_core::{
    AccessRightsKind, AppError, CoordinateSystem, DataProvider, DiffusionStatus, Event,
    GeoPositioner, InvalidObservation, PositionInput, ProcessedObservation, Taxon,
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn provider() -> DataProvider {
    DataProvider::new(7, "artportalen", "Artportalen").with_coordinate_uncertainty(100)
}

/// Source row as a reader would deliver it.
#[derive(Debug, Clone)]
pub struct VerbatimObservation {
    pub id: i64,
    pub occurrence_id: String,
    pub sensitivity_category: i32,
    pub not_for_public_usage: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub taxon_id: Option<i32>,
    pub longitude: f64,
    pub latitude: f64,
    pub coordinate_system: CoordinateSystem,
    /// The provider already generalized the public version.
    pub provider_diffused: bool,
}

impl VerbatimObservation {
    pub fn new(id: i64, sensitivity_category: i32, start_date: DateTime<Utc>) -> Self {
        Self {
            id,
            occurrence_id: format!("urn:lsid:artportalen.se:sighting:{id}"),
            sensitivity_category,
            not_for_public_usage: false,
            start_date: Some(start_date),
            taxon_id: Some(100_000 + id as i32),
            longitude: 17.94 + id as f64 * 0.0001,
            latitude: 59.41,
            coordinate_system: CoordinateSystem::Wgs84,
            provider_diffused: false,
        }
    }
}

/// Records `1..=n`, the first `public` of them category 1, the rest category 3.
pub fn mixed_records(n: i64, public: i64, start_date: DateTime<Utc>) -> Vec<VerbatimObservation> {
    (1..=n)
        .map(|id| {
            let category = if id <= public { 1 } else { 3 };
            VerbatimObservation::new(id, category, start_date)
        })
        .collect()
}

/// Tracks how many fetches overlap.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MemorySource {
    records: Vec<VerbatimObservation>,
    fetch_delay: Option<Duration>,
    probe: Option<Arc<ConcurrencyProbe>>,
    /// Fired after the first fetch returns.
    cancel_after_first_fetch: Option<CancellationToken>,
    fail_window_starting_at: Option<i64>,
    fetches: AtomicUsize,
    requested: Arc<Mutex<Vec<i64>>>,
}

impl MemorySource {
    pub fn new(records: Vec<VerbatimObservation>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration, probe: Arc<ConcurrencyProbe>) -> Self {
        self.fetch_delay = Some(delay);
        self.probe = Some(probe);
        self
    }

    pub fn cancelling_after_first_fetch(mut self, token: CancellationToken) -> Self {
        self.cancel_after_first_fetch = Some(token);
        self
    }

    pub fn failing_window_at(mut self, start_id: i64) -> Self {
        self.fail_window_starting_at = Some(start_id);
        self
    }

    /// Start ids of every requested window, failed ones included.
    ///
    /// The handle stays valid after the source moves into a processor.
    pub fn requested_starts(&self) -> Arc<Mutex<Vec<i64>>> {
        Arc::clone(&self.requested)
    }
}

impl VerbatimSource for MemorySource {
    type Record = VerbatimObservation;

    async fn get_max_id(&self, _provider: &DataProvider) -> Result<i64, AppError> {
        Ok(self.records.iter().map(|r| r.id).max().unwrap_or(0))
    }

    async fn get_batch(
        &self,
        _provider: &DataProvider,
        start_id: i64,
        end_id: i64,
    ) -> Result<Vec<VerbatimObservation>, AppError> {
        self.requested.lock().unwrap().push(start_id);
        if self.fail_window_starting_at == Some(start_id) {
            return Err(AppError::SourceError(format!(
                "archive unreadable at {start_id}"
            )));
        }

        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(probe) = &self.probe {
            probe.exit();
        }

        let batch = self
            .records
            .iter()
            .filter(|r| r.id >= start_id && r.id <= end_id)
            .cloned()
            .collect();

        if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(token) = &self.cancel_after_first_fetch {
                token.cancel();
            }
        }
        Ok(batch)
    }
}

/// Builds observations through the real positioner.
pub struct TestFactory {
    provider: DataProvider,
    positioner: GeoPositioner,
}

impl TestFactory {
    pub fn new(provider: DataProvider) -> Self {
        Self {
            provider,
            positioner: GeoPositioner::default(),
        }
    }
}

impl ObservationFactory for TestFactory {
    type Verbatim = VerbatimObservation;

    fn transform(
        &self,
        verbatim: &VerbatimObservation,
        diffuse: bool,
    ) -> Option<ProcessedObservation> {
        let taxon_id = verbatim.taxon_id?;

        let mut observation =
            ProcessedObservation::new(self.provider.id, verbatim.occurrence_id.clone());
        observation.sensitivity_category = verbatim.sensitivity_category;
        if verbatim.not_for_public_usage {
            observation.access_rights = Some(AccessRightsKind::NotForPublicUsage);
        }
        observation.event = Some(Event {
            start_date: verbatim.start_date,
            end_date: verbatim.start_date,
        });
        observation.taxon = Some(Taxon {
            id: taxon_id,
            scientific_name: None,
            disturbance_radius: Some(250),
        });

        let (longitude, latitude) = if diffuse && verbatim.provider_diffused {
            observation.diffusion_status = DiffusionStatus::DiffusedByProvider;
            (verbatim.longitude.floor(), verbatim.latitude.floor())
        } else {
            (verbatim.longitude, verbatim.latitude)
        };
        let input = PositionInput {
            longitude,
            latitude,
            coordinate_system: verbatim.coordinate_system,
            disturbance_radius_in_meters: Some(250),
            ..PositionInput::default()
        };
        observation.location = Some(self.positioner.position(&input, &self.provider));

        Some(observation)
    }
}

/// Snaps coordinates to a 0.1 degree grid.
#[derive(Clone, Default)]
pub struct GridDiffusion {
    pub calls: Arc<AtomicUsize>,
}

impl GridDiffusion {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DiffusionService for GridDiffusion {
    fn diffuse(&self, observation: &mut ProcessedObservation) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(location) = observation.location.as_mut() {
            location.decimal_longitude = location.decimal_longitude.map(snap);
            location.decimal_latitude = location.decimal_latitude.map(snap);
            location.point_with_disturbance_buffer = None;
        }
    }
}

fn snap(value: f64) -> f64 {
    (value * 10.0).floor() / 10.0
}

/// Rejects the listed occurrence ids.
#[derive(Clone, Default)]
pub struct RejectingValidation {
    reject: HashSet<String>,
    record_fails: bool,
    pub recorded: Arc<Mutex<Vec<InvalidObservation>>>,
}

impl RejectingValidation {
    pub fn rejecting(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            reject: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Makes every `record_invalid` call fail.
    pub fn failing_to_record(mut self) -> Self {
        self.record_fails = true;
        self
    }
}

impl ValidationService for RejectingValidation {
    fn validate(
        &self,
        observations: &mut Vec<ProcessedObservation>,
        provider: &DataProvider,
    ) -> Vec<InvalidObservation> {
        let mut invalid = Vec::new();
        observations.retain(|obs| {
            if self.reject.contains(&obs.occurrence_id) {
                invalid.push(InvalidObservation {
                    data_provider_id: provider.id,
                    occurrence_id: obs.occurrence_id.clone(),
                    defects: vec!["rejected".to_string()],
                });
                false
            } else {
                true
            }
        });
        invalid
    }

    async fn record_invalid(&self, invalid: Vec<InvalidObservation>) -> Result<(), AppError> {
        if self.record_fails {
            return Err(AppError::Generic("invalid store unavailable".to_string()));
        }
        self.recorded.lock().unwrap().extend(invalid);
        Ok(())
    }
}

#[derive(Default)]
struct SinkState {
    documents: Mutex<Vec<ProcessedObservation>>,
    failures_left: AtomicU32,
    writes: AtomicUsize,
}

/// Document store shared between the processor and the test.
#[derive(Clone)]
pub struct MemorySink {
    state: Arc<SinkState>,
    batch_size: usize,
}

impl MemorySink {
    pub fn new(batch_size: usize) -> Self {
        Self {
            state: Arc::new(SinkState::default()),
            batch_size,
        }
    }

    /// Makes the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.state.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn seed(&self, documents: Vec<ProcessedObservation>) {
        self.state.documents.lock().unwrap().extend(documents);
    }

    pub fn documents(&self) -> Vec<ProcessedObservation> {
        self.state.documents.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.state.documents.lock().unwrap().len()
    }

    pub fn occurrence_ids(&self) -> HashSet<String> {
        self.documents()
            .into_iter()
            .map(|doc| doc.occurrence_id)
            .collect()
    }

    pub fn writes(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }
}

impl ObservationSink for MemorySink {
    async fn add_many(&self, records: &[ProcessedObservation]) -> Result<usize, AppError> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .state
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::Generic("store unavailable".to_string()));
        }
        self.state
            .documents
            .lock()
            .unwrap()
            .extend_from_slice(records);
        Ok(records.len())
    }

    async fn delete_by_occurrence_ids(
        &self,
        provider: &DataProvider,
        occurrence_ids: &[String],
    ) -> Result<bool, AppError> {
        self.state.documents.lock().unwrap().retain(|doc| {
            doc.data_provider_id != provider.id || !occurrence_ids.contains(&doc.occurrence_id)
        });
        Ok(true)
    }

    async fn delete_provider_data(&self, provider: &DataProvider) -> Result<bool, AppError> {
        self.state
            .documents
            .lock()
            .unwrap()
            .retain(|doc| doc.data_provider_id != provider.id);
        Ok(true)
    }

    fn max_write_batch_size(&self) -> usize {
        self.batch_size
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ExportBehavior {
    #[default]
    Accept,
    Refuse,
    Fail,
}

/// Collects exported records by batch id.
#[derive(Clone, Default)]
pub struct MemoryExport {
    behavior: ExportBehavior,
    pub appended: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryExport {
    /// Every append returns an error.
    pub fn failing() -> Self {
        Self {
            behavior: ExportBehavior::Fail,
            ..Self::default()
        }
    }

    /// Every append is declined with `Ok(false)`.
    pub fn refusing() -> Self {
        Self {
            behavior: ExportBehavior::Refuse,
            ..Self::default()
        }
    }

    pub fn exported_ids(&self) -> HashSet<String> {
        self.appended
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id)| id.clone())
            .collect()
    }
}

impl ExportSink for MemoryExport {
    async fn append_observations(
        &self,
        records: &[ProcessedObservation],
        _provider: &DataProvider,
        batch_id: &str,
    ) -> Result<bool, AppError> {
        match self.behavior {
            ExportBehavior::Fail => {
                return Err(AppError::Io(std::io::Error::other("export volume full")));
            }
            ExportBehavior::Refuse => return Ok(false),
            ExportBehavior::Accept => {}
        }
        let mut appended = self.appended.lock().unwrap();
        appended.extend(
            records
                .iter()
                .map(|r| (batch_id.to_string(), r.occurrence_id.clone())),
        );
        Ok(true)
    }
}
