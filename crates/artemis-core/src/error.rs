use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Verbatim source error: {0}")]
    SourceError(String),

    #[error("Commit to {sink} sink failed for batch {batch_id} after {attempts} attempt(s): {message}")]
    CommitFailed {
        sink: &'static str,
        batch_id: String,
        attempts: u32,
        message: String,
    },

    #[error("Admission gate is closed")]
    GateClosed,

    #[error("Window task failed: {0}")]
    TaskFailed(String),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Generic error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns true for cooperative cancellation, which is not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::TaskFailed(err.to_string())
    }
}
