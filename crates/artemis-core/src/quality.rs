//! Content fingerprint used by downstream duplicate detection.

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use crate::ProcessedObservation;

/// Computes the data-quality key for an observation.
///
/// The key hashes `start-taxon-lon/lat` and is only defined when the start
/// date, taxon id and both (non-zero) coordinates are present.
pub fn compute_data_quality_key(observation: &ProcessedObservation) -> Option<String> {
    let start = observation.event.as_ref()?.start_date?;
    let taxon_id = observation.taxon.as_ref()?.id;
    let location = observation.location.as_ref()?;
    let lon = location.decimal_longitude.filter(|v| *v != 0.0)?;
    let lat = location.decimal_latitude.filter(|v| *v != 0.0)?;

    let fingerprint = format!(
        "{}-{}-{:.5}/{:.5}",
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        taxon_id,
        lon,
        lat
    );
    Some(format!("{:x}", Sha256::digest(fingerprint.as_bytes())))
}

/// Sets or clears `data_quality_key` in place.
pub fn assign_data_quality_key(observation: &mut ProcessedObservation) {
    observation.data_quality_key = compute_data_quality_key(observation);
}
