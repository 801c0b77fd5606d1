use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid deadline: {0}")]
    InvalidDeadline(String),

    #[error("Invalid TodoId: {0}")]
    InvalidTodoId(String),
}
