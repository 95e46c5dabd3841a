//! Windowed, admission-gated processing of a provider's verbatim records.
//!
//! # Architecture
//!
//! The provider's id range `[1, max_id]` is split into fixed-size
//! [`IdWindow`]s. Each window runs as its own tokio task once it holds an
//! [`AdmissionGate`] slot:
//!
//! 1. **Fetch** the verbatim records of the window
//! 2. **Transform and classify** them on rayon inside `spawn_blocking`; each
//!    worker returns its own placement and a single reduction builds the
//!    window's [`ClassifiedBatch`]
//! 3. **Validate** both sets, recording rejected records best-effort
//! 4. **Reconcile** (incremental runs): delete stale copies from both sinks
//! 5. **Commit** public and protected records concurrently
//! 6. **Export** committed public records (full runs, best-effort)
//!
//! Windows are launched without waiting for earlier ones; only the gate
//! bounds how many are in flight. Cancellation and window failures stop new
//! windows from launching, while windows already running finish and keep
//! their commits.

use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::admission::{AdmissionGate, AdmissionPermit};
use crate::persist::Persister;
use crate::progress::{ProcessEvent, ProgressReporter};
use crate::sensitivity::{ClassificationPolicy, ClassifiedBatch, classify};
use crate::traits::{
    DiffusionService, ExportSink, ObservationFactory, ObservationSink, ValidationService,
    VerbatimSource,
};
use crate::{
    AppError, DataProvider, IdWindow, ProcessConfig, ProcessMode, ProcessStats,
    ProcessedObservation, WindowResult,
};

/// Splits `[1, max_id]` into consecutive windows of `size` ids.
///
/// The last window ends at `max_id` and may be shorter.
pub fn id_windows(max_id: i64, size: usize) -> Vec<IdWindow> {
    let size = size.max(1) as i64;
    let mut windows = Vec::new();
    let mut start_id = 1;
    while start_id <= max_id {
        let end_id = (start_id + size - 1).min(max_id);
        windows.push(IdWindow { start_id, end_id });
        start_id = end_id + 1;
    }
    windows
}

/// Public and protected stores plus the export side-channel.
#[derive(Debug, Clone)]
pub struct ObservationSinks<S, X> {
    pub public: S,
    pub protected: S,
    pub export: X,
}

impl<S, X> ObservationSinks<S, X> {
    pub fn new(public: S, protected: S, export: X) -> Self {
        Self {
            public,
            protected,
            export,
        }
    }
}

/// Collaborators and settings shared by every window of a processor.
pub(crate) struct Pipeline<V, F, D, Q, S, X> {
    pub(crate) source: V,
    pub(crate) factory: F,
    pub(crate) diffusion: D,
    pub(crate) validation: Q,
    pub(crate) sinks: ObservationSinks<S, X>,
    pub(crate) persister: Persister,
    pub(crate) config: ProcessConfig,
}

impl<V, F, D, Q, S, X> Pipeline<V, F, D, Q, S, X>
where
    V: VerbatimSource + 'static,
    F: ObservationFactory<Verbatim = V::Record> + 'static,
    D: DiffusionService + 'static,
    Q: ValidationService + 'static,
    S: ObservationSink + 'static,
    X: ExportSink + 'static,
{
    /// Runs all windows for a provider.
    ///
    /// # Errors
    ///
    /// Returns the first window failure, or `AppError::Cancelled` if `cancel`
    /// fired before every window was launched.
    pub(crate) async fn run_windows<R: ProgressReporter>(
        self: &Arc<Self>,
        gate: &AdmissionGate,
        provider: &DataProvider,
        windows: Vec<IdWindow>,
        mode: ProcessMode,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<ProcessStats, AppError> {
        let shared_provider = Arc::new(provider.clone());
        // Fired by the caller or by the first failing window.
        let stop = cancel.child_token();
        let mut tasks: JoinSet<(IdWindow, Result<WindowResult, AppError>)> = JoinSet::new();
        let mut tally = WindowTally::default();

        for window in windows {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break None,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        tally.record(joined, provider, &stop, reporter);
                    }
                    acquired = gate.acquire() => match acquired {
                        Ok(permit) => break Some(permit),
                        Err(e) => {
                            tally.fail(e, &stop);
                            break None;
                        }
                    },
                }
            };
            let Some(permit) = permit else {
                break;
            };

            tasks.spawn(Self::spawn_window(
                Arc::clone(self),
                permit,
                Arc::clone(&shared_provider),
                window,
                mode,
                stop.clone(),
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            tally.record(joined, provider, &stop, reporter);
        }

        if let Some(error) = tally.first_error {
            return Err(error);
        }
        if cancel.is_cancelled() {
            tracing::info!(
                provider = %provider,
                windows = tally.stats.windows,
                "Cancelled, committed windows retained"
            );
            return Err(AppError::Cancelled);
        }
        Ok(tally.stats)
    }

    async fn spawn_window(
        pipeline: Arc<Self>,
        permit: AdmissionPermit,
        provider: Arc<DataProvider>,
        window: IdWindow,
        mode: ProcessMode,
        stop: CancellationToken,
    ) -> (IdWindow, Result<WindowResult, AppError>) {
        let result = pipeline.process_window(&provider, window, mode, &stop).await;
        // Stop before the slot frees up, so the launch loop sees the failure
        // ahead of the released permit.
        if matches!(&result, Err(e) if !e.is_cancelled()) {
            stop.cancel();
        }
        permit.release();
        (window, result)
    }

    /// Fetches, classifies and commits one window.
    pub(crate) async fn process_window(
        self: &Arc<Self>,
        provider: &DataProvider,
        window: IdWindow,
        mode: ProcessMode,
        stop: &CancellationToken,
    ) -> Result<WindowResult, AppError> {
        if stop.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let batch_id = window.batch_id();
        let verbatims = self
            .source
            .get_batch(provider, window.start_id, window.end_id)
            .await?;
        if verbatims.is_empty() {
            tracing::debug!(provider = %provider, window = %window, "Empty window");
            return Ok(WindowResult {
                window,
                public_count: 0,
                protected_count: 0,
            });
        }
        let fetched = verbatims.len();

        let policy = ClassificationPolicy::new(self.config.diffusion_enabled, Utc::now());
        let pipeline = Arc::clone(self);
        let batch =
            tokio::task::spawn_blocking(move || pipeline.classify_window(&verbatims, &policy))
                .await?;

        let occurrence_ids = batch.occurrence_ids();
        let (mut public, mut protected) = batch.into_sets();
        self.validate(&mut public, provider, &batch_id).await;
        self.validate(&mut protected, provider, &batch_id).await;

        if !mode.is_full() {
            self.persister
                .reconcile(
                    &self.sinks.public,
                    &self.sinks.protected,
                    provider,
                    &occurrence_ids,
                    &batch_id,
                )
                .await?;
        }

        let (public_count, protected_count) = self
            .persister
            .commit_window(
                &self.sinks.public,
                &self.sinks.protected,
                &public,
                &protected,
                &batch_id,
            )
            .await?;

        if mode.is_full() {
            self.persister
                .export(&self.sinks.export, &public, provider, &batch_id)
                .await;
        }

        tracing::debug!(
            provider = %provider,
            window = %window,
            fetched,
            public_count,
            protected_count,
            "Window committed"
        );

        Ok(WindowResult {
            window,
            public_count,
            protected_count,
        })
    }

    /// Transforms and classifies a window's records in parallel.
    fn classify_window(
        &self,
        verbatims: &[V::Record],
        policy: &ClassificationPolicy,
    ) -> ClassifiedBatch {
        let placements: Vec<_> = verbatims
            .par_iter()
            .map(|verbatim| {
                let observation = self.factory.transform(verbatim, false)?;
                Some(classify(
                    observation,
                    || self.factory.transform(verbatim, true),
                    &self.diffusion,
                    policy,
                ))
            })
            .collect();

        ClassifiedBatch::from_placements(placements.into_iter().flatten())
    }

    async fn validate(
        &self,
        records: &mut Vec<ProcessedObservation>,
        provider: &DataProvider,
        batch_id: &str,
    ) {
        let invalid = self.validation.validate(records, provider);
        if invalid.is_empty() {
            return;
        }

        tracing::warn!(
            provider = %provider,
            batch_id,
            count = invalid.len(),
            "Removed invalid observations"
        );
        if let Err(e) = self.validation.record_invalid(invalid).await {
            tracing::warn!(
                provider = %provider,
                batch_id,
                error = %e,
                "Failed to record invalid observations"
            );
        }
    }
}

/// Folds finished windows into run totals.
#[derive(Default)]
struct WindowTally {
    stats: ProcessStats,
    first_error: Option<AppError>,
}

impl WindowTally {
    fn record<R: ProgressReporter>(
        &mut self,
        joined: Result<(IdWindow, Result<WindowResult, AppError>), tokio::task::JoinError>,
        provider: &DataProvider,
        stop: &CancellationToken,
        reporter: &R,
    ) {
        match joined {
            Ok((_, Ok(result))) => {
                self.stats.add(&result);
                reporter.report(ProcessEvent::WindowCompleted {
                    provider,
                    window: result.window,
                    public_count: result.public_count,
                    protected_count: result.protected_count,
                });
            }
            Ok((window, Err(AppError::Cancelled))) => {
                tracing::debug!(provider = %provider, window = %window, "Window skipped");
            }
            Ok((window, Err(e))) => {
                let message = e.to_string();
                tracing::error!(
                    provider = %provider,
                    window = %window,
                    error = %message,
                    "Window failed"
                );
                reporter.report(ProcessEvent::WindowFailed {
                    provider,
                    window,
                    error: &message,
                });
                self.fail(e, stop);
            }
            Err(join_error) => {
                tracing::error!(provider = %provider, error = %join_error, "Window task panicked");
                self.fail(join_error.into(), stop);
            }
        }
    }

    fn fail(&mut self, error: AppError, stop: &CancellationToken) {
        stop.cancel();
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }
}
