use thiserror::Error as ThisError;

/// Failure of a lifecycle operation.
///
/// Every variant other than [`Error::Storage`] is raised before any mutation
/// is staged, so a failed operation never leaves a partial write behind.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Malformed or out-of-bounds input.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    /// The actor lacks the role the operation requires.
    #[error("not authorized: {0}")]
    Authorization(String),
    /// The operation is not allowed in the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// The store or the blob collaborator failed.
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::Authorization(_) => "authorization",
            Error::InvalidState(_) => "invalid_state",
            Error::NotFound { .. } => "not_found",
            Error::Storage(_) => "storage",
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_and_messages() {
        let err = Error::validation("title", "must be at least 5 characters");
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.field(), Some("title"));
        assert_eq!(err.to_string(), "invalid title: must be at least 5 characters");

        let err = Error::not_found("bet", "bet-1");
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.field(), None);
        assert_eq!(err.to_string(), "bet not found: bet-1");

        let err = Error::from(anyhow::anyhow!("disk full"));
        assert_eq!(err.kind(), "storage");
    }
}
