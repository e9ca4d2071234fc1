use thiserror::Error;

#[derive(Error, Debug)]
pub enum DroverError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Cloud manager unavailable: {0}")]
    CloudUnavailable(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid cron expression {expr:?}: {message}")]
    InvalidCron { expr: String, message: String },

    #[error("Lock already held: {0}")]
    DuplicateLock(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),
}

pub type Result<T> = std::result::Result<T, DroverError>;
