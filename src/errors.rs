/// Domain-wide error type for the interview core.
///
/// Mirrors the error kinds enumerated in the system's error handling
/// design: each kind maps to exactly one fixed HTTP status, and
/// internal retry kinds never escape the gateway/pipeline layer that
/// recovers them.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Model transient error: {0}")]
    ModelTransientError(String),

    #[error("Model schema error: {0}")]
    ModelSchemaError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl CoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CoreError::InvalidRequest(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        CoreError::PreconditionFailed(message.into())
    }

    /// Fixed status code per the system's error handling design.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::InvalidRequest(_) => 400,
            CoreError::NotFound(_) => 404,
            CoreError::PreconditionFailed(_) => 409,
            CoreError::ModelTransientError(_) => 500,
            CoreError::ModelSchemaError(_) => 500,
            CoreError::StorageError(_) => 500,
            CoreError::Cancelled(_) => 500,
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
            other => CoreError::StorageError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::ModelTransientError(e.to_string())
    }
}

impl From<crate::gateway::ModelError> for CoreError {
    fn from(e: crate::gateway::ModelError) -> Self {
        match e {
            crate::gateway::ModelError::Schema(msg) => CoreError::ModelSchemaError(msg),
            crate::gateway::ModelError::Transient(msg) => CoreError::ModelTransientError(msg),
            crate::gateway::ModelError::NotConfigured(msg) => CoreError::InvalidRequest(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec() {
        assert_eq!(CoreError::invalid("x").http_status(), 400);
        assert_eq!(CoreError::not_found("x").http_status(), 404);
        assert_eq!(CoreError::precondition("x").http_status(), 409);
        assert_eq!(CoreError::ModelSchemaError("x".into()).http_status(), 500);
    }
}
