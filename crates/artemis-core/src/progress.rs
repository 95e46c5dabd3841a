//! Progress reporting for processing runs.
//!
//! This module provides a trait-based abstraction for reporting progress during
//! a run, decoupling logging and UI updates from the pipeline.

use crate::{DataProvider, IdWindow, ProcessMode, RunOutcome};

/// Events emitted while a provider is processed.
#[derive(Debug, Clone)]
pub enum ProcessEvent<'a> {
    /// Run accepted, nothing touched yet.
    RunStarted {
        /// Provider being processed.
        provider: &'a DataProvider,
        /// Full or incremental.
        mode: ProcessMode,
    },

    /// Prior data purged before a full run.
    ProviderPurged {
        /// Provider whose documents were deleted.
        provider: &'a DataProvider,
        /// Whether both sinks acknowledged the purge.
        success: bool,
    },

    /// Highest verbatim id known for the provider.
    MaxIdResolved {
        /// Provider being processed.
        provider: &'a DataProvider,
        /// Highest verbatim id (0 for an empty source).
        max_id: i64,
        /// Number of id windows the run will cover.
        window_count: usize,
    },

    /// A window was committed to both sinks.
    WindowCompleted {
        /// Provider being processed.
        provider: &'a DataProvider,
        /// Id range of the committed window.
        window: IdWindow,
        /// Documents written to the public sink.
        public_count: usize,
        /// Documents written to the protected sink.
        protected_count: usize,
    },

    /// A window failed; the run will fail.
    WindowFailed {
        /// Provider being processed.
        provider: &'a DataProvider,
        /// Id range of the failed window.
        window: IdWindow,
        /// Error message.
        error: &'a str,
    },

    /// Terminal outcome of the run.
    RunCompleted {
        /// Provider that was processed.
        provider: &'a DataProvider,
        /// Final outcome with counts or error.
        outcome: &'a RunOutcome,
    },
}

/// Trait for reporting processing progress.
///
/// Implementors can provide CLI output, job status updates, metrics,
/// or any other form of progress reporting.
///
/// The default implementation does nothing (silent mode), which is
/// appropriate for library usage where the caller doesn't need progress updates.
///
/// # Example
///
/// ```
/// use artemis_core::progress::{ProcessEvent, ProgressReporter};
///
/// struct WindowCounter;
///
/// impl ProgressReporter for WindowCounter {
///     fn report(&self, event: ProcessEvent<'_>) {
///         if let ProcessEvent::WindowCompleted { window, .. } = event {
///             println!("Committed {}", window);
///         }
///     }
/// }
/// ```
pub trait ProgressReporter: Send + Sync {
    /// Called when a processing event occurs.
    fn report(&self, event: ProcessEvent<'_>) {
        let _ = event;
    }
}

/// A no-op reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// A reporter that logs events using the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProcessEvent<'_>) {
        use tracing::{error, info, warn};

        match event {
            ProcessEvent::RunStarted { provider, mode } => {
                info!("[{}] Starting {} processing", provider, mode.as_str());
            }
            ProcessEvent::ProviderPurged { provider, success } => {
                if success {
                    info!("[{}] Purged existing observations", provider);
                } else {
                    warn!("[{}] Purge of existing observations was not acknowledged", provider);
                }
            }
            ProcessEvent::MaxIdResolved {
                provider,
                max_id,
                window_count,
            } => {
                info!(
                    "[{}] {} verbatim record id(s) in {} window(s)",
                    provider, max_id, window_count
                );
            }
            ProcessEvent::WindowCompleted {
                provider,
                window,
                public_count,
                protected_count,
            } => {
                info!(
                    "[{}] Window {} committed: {} public, {} protected",
                    provider, window, public_count, protected_count
                );
            }
            ProcessEvent::WindowFailed {
                provider,
                window,
                error,
            } => {
                error!("[{}] Window {} failed: {}", provider, window, error);
            }
            ProcessEvent::RunCompleted { provider, outcome } => match outcome {
                RunOutcome::Success {
                    start,
                    end,
                    public_count,
                    protected_count,
                    ..
                } => {
                    info!(
                        "[{}] Processing succeeded in {}s: {} public, {} protected",
                        provider,
                        (*end - *start).num_seconds(),
                        public_count,
                        protected_count
                    );
                }
                RunOutcome::Cancelled { .. } => {
                    warn!("[{}] Processing cancelled", provider);
                }
                RunOutcome::Failed { .. } => {
                    error!("[{}] Processing failed", provider);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_silent_reporter_does_nothing() {
        let reporter = SilentReporter;
        let provider = DataProvider::new(1, "test", "Test");
        reporter.report(ProcessEvent::RunStarted {
            provider: &provider,
            mode: ProcessMode::Full,
        });
    }

    #[test]
    fn test_tracing_reporter_handles_all_events() {
        let reporter = TracingReporter;
        let provider = DataProvider::new(1, "test", "Test");
        let window = IdWindow {
            start_id: 1,
            end_id: 40,
        };

        reporter.report(ProcessEvent::RunStarted {
            provider: &provider,
            mode: ProcessMode::Incremental,
        });
        reporter.report(ProcessEvent::ProviderPurged {
            provider: &provider,
            success: false,
        });
        reporter.report(ProcessEvent::MaxIdResolved {
            provider: &provider,
            max_id: 100,
            window_count: 3,
        });
        reporter.report(ProcessEvent::WindowCompleted {
            provider: &provider,
            window,
            public_count: 30,
            protected_count: 10,
        });
        reporter.report(ProcessEvent::WindowFailed {
            provider: &provider,
            window,
            error: "connection failed",
        });

        let now = Utc::now();
        for outcome in [
            RunOutcome::Success {
                provider_id: 1,
                start: now,
                end: now,
                public_count: 1,
                protected_count: 0,
            },
            RunOutcome::Cancelled {
                provider_id: 1,
                start: now,
                end: now,
            },
            RunOutcome::Failed {
                provider_id: 1,
                start: now,
                end: now,
            },
        ] {
            reporter.report(ProcessEvent::RunCompleted {
                provider: &provider,
                outcome: &outcome,
            });
        }
    }
}
