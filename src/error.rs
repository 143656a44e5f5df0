use thiserror::Error;

/// Top-level error type for the worker
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payment instruction error: {0}")]
    PaymentInstruction(#[from] PaymentInstructionError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the payment-instruction service client
#[derive(Error, Debug)]
pub enum PaymentInstructionError {
    #[error("Payment instruction client not configured: {0}")]
    NotConfigured(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Cycle-level failures. Per-entry failures never surface here.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Reconciliation cycle timed out after {elapsed_ms}ms")]
    CycleTimeout { elapsed_ms: u64 },

    #[error("Candidate query failed: {0}")]
    CandidateQuery(#[source] AppError),
}

impl From<reqwest::Error> for PaymentInstructionError {
    fn from(error: reqwest::Error) -> Self {
        PaymentInstructionError::Transport(format!("HTTP request error: {:?}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
