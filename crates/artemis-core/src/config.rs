use std::time::Duration;

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// Retry policy for sink commits.
///
/// After failed attempt `n` the persister sleeps `n * retry_base_delay`.
#[derive(Debug, Clone)]
pub struct CommitRetryConfig {
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for CommitRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

impl CommitRetryConfig {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.retry_base_delay * attempt
    }
}

/// Pipeline configuration for one processor.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Overrides the public sink's write batch size as the id window size.
    pub window_size: Option<usize>,
    /// When false every protected record is kept out of the public sink.
    pub diffusion_enabled: bool,
    pub commit_retry: CommitRetryConfig,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            window_size: None,
            diffusion_enabled: true,
            commit_retry: CommitRetryConfig::default(),
        }
    }
}

impl ProcessConfig {
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = Some(size);
        self
    }

    pub fn with_diffusion(mut self, enabled: bool) -> Self {
        self.diffusion_enabled = enabled;
        self
    }

    pub fn with_commit_retry(mut self, retry: CommitRetryConfig) -> Self {
        self.commit_retry = retry;
        self
    }

    /// Window size to use given the sink's own write batch size.
    pub fn effective_window_size(&self, sink_batch_size: usize) -> usize {
        self.window_size.unwrap_or(sink_batch_size).max(1)
    }
}

/// Process-wide admission control.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub slots: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { slots: 10 }
    }
}

/// Values filled into every location regardless of coordinates.
#[derive(Debug, Clone)]
pub struct LocationDefaults {
    pub continent: String,
    pub country: String,
    pub max_coordinate_uncertainty_in_meters: i32,
}

impl Default for LocationDefaults {
    fn default() -> Self {
        Self {
            continent: "Europe".to_string(),
            country: "Sweden".to_string(),
            max_coordinate_uncertainty_in_meters: 500_000,
        }
    }
}
