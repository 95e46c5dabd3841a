//! Process-wide admission control for processing windows.
//!
//! One [`AdmissionGate`] is shared by every processor in the process, so the
//! number of windows holding fetched records, running transforms or writing
//! to the sinks is bounded regardless of how many providers run at once.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::AppError;

/// Counting semaphore gating in-flight windows.
///
/// Cloning is cheap and shares the underlying slots.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Slot held by a window. The slot is released on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// Releases the slot. Equivalent to dropping the permit.
    pub fn release(self) {}
}

impl AdmissionGate {
    pub fn new(slots: usize) -> Self {
        let capacity = slots.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits until a slot is free.
    ///
    /// # Errors
    ///
    /// Returns `AppError::GateClosed` once [`close`](Self::close) was called.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AppError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AppError::GateClosed)?;
        Ok(AdmissionPermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Rejects all pending and future acquisitions.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(crate::AdmissionConfig::default().slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release_slots() {
        let gate = AdmissionGate::new(2);
        let first = gate.acquire().await.unwrap();
        let _second = gate.acquire().await.unwrap();
        assert_eq!(gate.available_slots(), 0);

        first.release();
        assert_eq!(gate.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_free_slot() {
        let gate = AdmissionGate::new(1);
        let held = gate.acquire().await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(waiting.is_err(), "second acquire should block");

        drop(held);
        let acquired = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_slots() {
        let gate = AdmissionGate::new(1);
        let other = gate.clone();
        let _held = gate.acquire().await.unwrap();
        assert_eq!(other.available_slots(), 0);
    }

    #[tokio::test]
    async fn test_closed_gate_rejects() {
        let gate = AdmissionGate::new(1);
        gate.close();
        assert!(matches!(gate.acquire().await, Err(AppError::GateClosed)));
    }

    #[test]
    fn test_zero_slots_become_one() {
        assert_eq!(AdmissionGate::new(0).capacity(), 1);
    }
}
