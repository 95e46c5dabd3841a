//! Public/protected classification and the diffusion gate.
//!
//! A record is protected when its sensitivity category is above 2 or its
//! access rights forbid public usage. Protected records may additionally be
//! published in diffused (generalized) form unless the temporal embargo
//! applies: highly sensitive sightings from the current month are never
//! published, not even diffused.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};

use crate::quality::assign_data_quality_key;
use crate::traits::DiffusionService;
use crate::{AccessRightsKind, DiffusionStatus, ProcessedObservation};

/// Highest sensitivity category that is still public.
pub const MAX_PUBLIC_SENSITIVITY_CATEGORY: i32 = 2;

/// Run-wide inputs to classification.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationPolicy {
    pub diffusion_enabled: bool,
    /// Reference time for the temporal embargo.
    pub now: DateTime<Utc>,
}

impl ClassificationPolicy {
    pub fn new(diffusion_enabled: bool, now: DateTime<Utc>) -> Self {
        Self {
            diffusion_enabled,
            now,
        }
    }
}

/// Where a classified record ends up.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Public(ProcessedObservation),
    Protected(ProcessedObservation),
    /// Exact record protected, generalized copy public under the same id.
    ProtectedAndDiffused {
        protected: ProcessedObservation,
        diffused: ProcessedObservation,
    },
}

impl Placement {
    pub fn occurrence_id(&self) -> &str {
        match self {
            Placement::Public(obs) | Placement::Protected(obs) => &obs.occurrence_id,
            Placement::ProtectedAndDiffused { protected, .. } => &protected.occurrence_id,
        }
    }

    pub fn is_public(&self) -> bool {
        !matches!(self, Placement::Protected(_))
    }

    pub fn is_protected(&self) -> bool {
        !matches!(self, Placement::Public(_))
    }
}

pub fn is_protected(observation: &ProcessedObservation) -> bool {
    observation.sensitivity_category > MAX_PUBLIC_SENSITIVITY_CATEGORY
        || observation.access_rights == Some(AccessRightsKind::NotForPublicUsage)
}

/// True when a protected record must not reach the public sink at all.
///
/// Suppressed when diffusion is off, or when a highly sensitive sighting's
/// start or end falls in the current year and its start or end falls in the
/// current month.
pub fn is_embargoed(observation: &ProcessedObservation, policy: &ClassificationPolicy) -> bool {
    if !policy.diffusion_enabled {
        return true;
    }

    if observation.sensitivity_category <= MAX_PUBLIC_SENSITIVITY_CATEGORY {
        return false;
    }

    let Some(event) = observation.event.as_ref() else {
        return false;
    };
    let dates: Vec<DateTime<Utc>> = [event.start_date, event.end_date]
        .into_iter()
        .flatten()
        .collect();

    let current_year = dates.iter().any(|d| d.year() == policy.now.year());
    let current_month = dates.iter().any(|d| d.month() == policy.now.month());

    current_year && current_month
}

/// Classifies a freshly transformed record.
///
/// `transform_diffused` re-runs the factory in diffuse mode; it is only
/// invoked for protected records that pass the embargo. Every record placed
/// gets its data-quality key assigned.
pub fn classify<D, T>(
    mut observation: ProcessedObservation,
    transform_diffused: T,
    diffusion: &D,
    policy: &ClassificationPolicy,
) -> Placement
where
    D: DiffusionService + ?Sized,
    T: FnOnce() -> Option<ProcessedObservation>,
{
    if !is_protected(&observation) {
        observation.protected = false;
        assign_data_quality_key(&mut observation);
        return Placement::Public(observation);
    }

    observation.protected = true;
    observation.sensitive = true;
    assign_data_quality_key(&mut observation);

    if is_embargoed(&observation, policy) {
        return Placement::Protected(observation);
    }

    let Some(mut diffused) = transform_diffused() else {
        tracing::debug!(
            occurrence_id = %observation.occurrence_id,
            "Diffuse-mode transform produced no record, keeping protected only"
        );
        return Placement::Protected(observation);
    };

    if diffused.diffusion_status != DiffusionStatus::DiffusedByProvider {
        diffusion.diffuse(&mut diffused);
        if diffused.diffusion_status == DiffusionStatus::NotDiffused {
            diffused.diffusion_status = DiffusionStatus::DiffusedBySystem;
        }
    }
    diffused.occurrence_id.clone_from(&observation.occurrence_id);
    diffused.protected = false;
    diffused.sensitive = true;
    assign_data_quality_key(&mut diffused);

    Placement::ProtectedAndDiffused {
        protected: observation,
        diffused,
    }
}

/// Public and protected records of one window, keyed by occurrence id.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedBatch {
    public: BTreeMap<String, ProcessedObservation>,
    protected: BTreeMap<String, ProcessedObservation>,
}

impl ClassifiedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduces placements in input order; later duplicates replace earlier ones.
    pub fn from_placements(placements: impl IntoIterator<Item = Placement>) -> Self {
        let mut batch = Self::new();
        for placement in placements {
            batch.insert(placement);
        }
        batch
    }

    pub fn insert(&mut self, placement: Placement) {
        let id = placement.occurrence_id().to_string();
        self.public.remove(&id);
        self.protected.remove(&id);

        match placement {
            Placement::Public(obs) => {
                self.public.insert(id, obs);
            }
            Placement::Protected(obs) => {
                self.protected.insert(id, obs);
            }
            Placement::ProtectedAndDiffused {
                protected,
                diffused,
            } => {
                self.public.insert(id.clone(), diffused);
                self.protected.insert(id, protected);
            }
        }
    }

    pub fn public(&self) -> &BTreeMap<String, ProcessedObservation> {
        &self.public
    }

    pub fn protected(&self) -> &BTreeMap<String, ProcessedObservation> {
        &self.protected
    }

    /// Distinct occurrence ids across both sets, sorted.
    pub fn occurrence_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .public
            .keys()
            .chain(self.protected.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.protected.is_empty()
    }

    /// Consumes the batch as `(public, protected)` record lists.
    pub fn into_sets(self) -> (Vec<ProcessedObservation>, Vec<ProcessedObservation>) {
        (
            self.public.into_values().collect(),
            self.protected.into_values().collect(),
        )
    }
}
