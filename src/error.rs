use miette::Diagnostic;
use thiserror::Error;

use crate::finally::traverser::TraverserError;

/// Result type for decompiler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Custom error types for the finally decompiler
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum Error {
    #[error("I/O error: {0}")]
    #[diagnostic(code(finally_dec::io_error))]
    Io(String),

    #[error("Malformed method input: {0}")]
    #[diagnostic(code(finally_dec::json_error))]
    Json(String),

    #[error("Invalid method '{method}': {message}")]
    #[diagnostic(code(finally_dec::invalid_method))]
    InvalidMethod { method: String, message: String },

    #[error("Traversal failed: {0}")]
    #[diagnostic(code(finally_dec::traversal_error))]
    Traversal(#[from] TraverserError),

    #[error("Internal error: {message}")]
    #[diagnostic(code(finally_dec::internal_error))]
    Internal { message: String },
}

impl Error {
    /// Create an invalid-method error
    pub fn invalid_method(method: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidMethod {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_message() {
        let err = Error::internal("boom");
        assert_eq!(err.to_string(), "Internal error: boom");
    }

    #[test]
    fn test_traverser_error_converts() {
        let err: Error = TraverserError::ExplorationLimit { limit: 3 }.into();
        assert!(matches!(err, Error::Traversal(_)));
        assert!(err.to_string().contains("3"));
    }
}
