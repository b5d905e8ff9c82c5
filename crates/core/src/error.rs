#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
