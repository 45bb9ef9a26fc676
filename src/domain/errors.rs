//! Domain errors for the halo remediation loop.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Trigger not found: {0}")]
    TriggerNotFound(Uuid),

    #[error("Target not found: {0}")]
    TargetNotFound(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
