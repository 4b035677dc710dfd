use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Failed to connect to the database: {0}")]
    ConnectionError(String),

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Transaction failure: {0}")]
    TransactionFailure(String),

    #[error("An unknown error occurred: {0}")]
    Unknown(String),

    #[error("Repository error: {0}")]
    Other(String),
}

impl RepositoryError {
    /// Connection and store level failures may succeed on a later attempt.
    /// Missing entities, bad data and uniqueness conflicts never do.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::ConnectionError(_)
                | RepositoryError::TransactionFailure(_)
                | RepositoryError::Other(_)
        )
    }
}
