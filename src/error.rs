use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the organization and feature flag stores.
///
/// Each kind maps to one transport outcome: `NotFound` and `PermissionDenied`
/// are safe to show to clients, `Persistence` and `IdentityAssertion` are
/// internal failures that should be logged and reported opaquely.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),

    #[error("storage returned identifier {actual}, expected {expected}")]
    IdentityAssertion { expected: Uuid, actual: Uuid },
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
