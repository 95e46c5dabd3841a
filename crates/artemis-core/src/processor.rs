//! Observation processor: the run-level state machine.
//!
//! # Architecture
//!
//! The [`ObservationProcessor`] is generic over the collaborators declared in
//! [`crate::traits`]:
//! - [`VerbatimSource`] - reads verbatim records by id window
//! - [`ObservationFactory`] - converts verbatim records
//! - [`DiffusionService`] - generalizes protected locations
//! - [`ValidationService`] - rejects invalid observations
//! - [`ObservationSink`] - public and protected stores
//! - [`ExportSink`] - side-channel for full runs
//!
//! A run moves through `NotStarted → Purging (full only) → Running` and ends
//! in exactly one [`RunOutcome`]. Window failures and cancellation are turned
//! into an outcome here and nowhere else.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{ObservationSinks, Pipeline, id_windows};
use crate::progress::{ProcessEvent, ProgressReporter, SilentReporter};
use crate::traits::{
    DiffusionService, ExportSink, ObservationFactory, ObservationSink, ValidationService,
    VerbatimSource,
};
use crate::{
    AdmissionGate, AppError, DataProvider, Persister, ProcessConfig, ProcessMode, ProcessStats,
    RunOutcome,
};

/// Processes a provider's verbatim records into public and protected observations.
///
/// # Type Parameters
///
/// * `V` - Verbatim source (e.g., a DwC-A reader)
/// * `F` - Factory matching the source's record type
/// * `D` - Diffusion service
/// * `Q` - Validation service
/// * `S` - Sink type used for both the public and the protected store
/// * `X` - Export sink
///
/// # Example
///
/// ```ignore
/// use artemis_core::{AdmissionGate, ObservationProcessor, ObservationSinks, ProcessMode};
/// use tokio_util::sync::CancellationToken;
///
/// let gate = AdmissionGate::new(10);
/// let sinks = ObservationSinks::new(public_repo, protected_repo, jsonl_export);
/// let processor = ObservationProcessor::new(source, factory, diffusion, validation, sinks, gate);
///
/// let outcome = processor
///     .run(&provider, ProcessMode::Incremental, &CancellationToken::new())
///     .await;
/// println!("{}: {}", provider, outcome.status());
/// ```
pub struct ObservationProcessor<V, F, D, Q, S, X> {
    pipeline: Arc<Pipeline<V, F, D, Q, S, X>>,
    gate: AdmissionGate,
}

impl<V, F, D, Q, S, X> Clone for ObservationProcessor<V, F, D, Q, S, X> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            gate: self.gate.clone(),
        }
    }
}

impl<V, F, D, Q, S, X> ObservationProcessor<V, F, D, Q, S, X>
where
    V: VerbatimSource + 'static,
    F: ObservationFactory<Verbatim = V::Record> + 'static,
    D: DiffusionService + 'static,
    Q: ValidationService + 'static,
    S: ObservationSink + 'static,
    X: ExportSink + 'static,
{
    /// Creates a processor with default configuration.
    ///
    /// `gate` is usually a clone of one process-wide gate so that every
    /// processor shares the same window budget.
    pub fn new(
        source: V,
        factory: F,
        diffusion: D,
        validation: Q,
        sinks: ObservationSinks<S, X>,
        gate: AdmissionGate,
    ) -> Self {
        Self::with_config(
            source,
            factory,
            diffusion,
            validation,
            sinks,
            gate,
            ProcessConfig::default(),
        )
    }

    /// Creates a processor with custom configuration.
    pub fn with_config(
        source: V,
        factory: F,
        diffusion: D,
        validation: Q,
        sinks: ObservationSinks<S, X>,
        gate: AdmissionGate,
        config: ProcessConfig,
    ) -> Self {
        let persister = Persister::new(config.commit_retry.clone());
        Self {
            pipeline: Arc::new(Pipeline {
                source,
                factory,
                diffusion,
                validation,
                sinks,
                persister,
                config,
            }),
            gate,
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.pipeline.config
    }

    /// Processes one provider and returns the run's outcome.
    pub async fn run(
        &self,
        provider: &DataProvider,
        mode: ProcessMode,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        self.run_with_progress(provider, mode, cancel, &SilentReporter)
            .await
    }

    /// Same as [`run`](Self::run), but emits progress events through `reporter`.
    pub async fn run_with_progress<R: ProgressReporter>(
        &self,
        provider: &DataProvider,
        mode: ProcessMode,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> RunOutcome {
        let start = Utc::now();
        reporter.report(ProcessEvent::RunStarted { provider, mode });

        let result = self.execute(provider, mode, cancel, reporter).await;
        let end = Utc::now();

        let outcome = match result {
            Ok(stats) => {
                tracing::info!(
                    provider = %provider,
                    mode = mode.as_str(),
                    public_count = stats.public_count,
                    protected_count = stats.protected_count,
                    windows = stats.windows,
                    "Processing succeeded"
                );
                RunOutcome::Success {
                    provider_id: provider.id,
                    start,
                    end,
                    public_count: stats.public_count,
                    protected_count: stats.protected_count,
                }
            }
            Err(e) if e.is_cancelled() => {
                tracing::warn!(provider = %provider, mode = mode.as_str(), "Processing cancelled");
                RunOutcome::Cancelled {
                    provider_id: provider.id,
                    start,
                    end,
                }
            }
            Err(e) => {
                tracing::error!(
                    provider = %provider,
                    mode = mode.as_str(),
                    error = %e,
                    "Processing failed"
                );
                RunOutcome::Failed {
                    provider_id: provider.id,
                    start,
                    end,
                }
            }
        };

        reporter.report(ProcessEvent::RunCompleted {
            provider,
            outcome: &outcome,
        });
        outcome
    }

    async fn execute<R: ProgressReporter>(
        &self,
        provider: &DataProvider,
        mode: ProcessMode,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<ProcessStats, AppError> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let pipeline = &self.pipeline;
        if mode.is_full() {
            let success = pipeline
                .persister
                .purge(&pipeline.sinks.public, &pipeline.sinks.protected, provider)
                .await;
            reporter.report(ProcessEvent::ProviderPurged { provider, success });
        }

        let max_id = pipeline.source.get_max_id(provider).await?;
        let window_size = pipeline
            .config
            .effective_window_size(pipeline.sinks.public.max_write_batch_size());
        let windows = id_windows(max_id, window_size);
        reporter.report(ProcessEvent::MaxIdResolved {
            provider,
            max_id,
            window_count: windows.len(),
        });

        pipeline
            .run_windows(&self.gate, provider, windows, mode, cancel, reporter)
            .await
    }
}
