// ─────────────────────────────────────────────────────────────────────
// MetaFed Inference — Error
// License: GNU AGPL v3
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaFedError {
    /// Required feature names absent from the request mapping.
    #[error("Missing required features: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Model inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by transport layers to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Validation,
    Transform,
    Inference,
    Startup,
}

impl MetaFedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetaFedError::Schema { .. } => ErrorKind::Schema,
            MetaFedError::Validation(_) => ErrorKind::Validation,
            MetaFedError::Transform(_) => ErrorKind::Transform,
            MetaFedError::Inference(_) => ErrorKind::Inference,
            MetaFedError::ConfigError(_) | MetaFedError::Io(_) | MetaFedError::Json(_) => {
                ErrorKind::Startup
            }
        }
    }

    /// True when the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Schema | ErrorKind::Validation)
    }
}

pub type MetaFedResult<T> = Result<T, MetaFedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_message_lists_fields() {
        let err = MetaFedError::Schema {
            missing: vec!["age".to_string(), "chol".to_string()],
        };
        assert_eq!(err.to_string(), "Missing required features: age, chol");
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_server_side_kinds() {
        assert!(!MetaFedError::Transform("bad scale".into()).is_client_error());
        assert!(!MetaFedError::Inference("shape".into()).is_client_error());
        let io = MetaFedError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
        assert_eq!(io.kind(), ErrorKind::Startup);
    }
}
