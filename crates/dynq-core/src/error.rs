//! Core error types.

use thiserror::Error;

use crate::catalog::BindError;
use crate::provider::ProviderError;
use dynq_lang::LangError;

/// Errors raised while composing or executing a dynamic query.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument was missing, empty or out of range.
    #[error("validation error: {0}")]
    Validation(String),

    /// Expression text could not be parsed or bound.
    #[error(transparent)]
    Parse(#[from] LangError),

    /// No operator overload matched the requested shape.
    #[error("bind error: {0}")]
    Bind(#[from] BindError),

    /// A generic type argument could not be inferred.
    #[error("inference error: {0}")]
    Inference(String),

    /// Failure reported by the query provider.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Create an inference error.
    pub fn inference(message: impl Into<String>) -> Self {
        Error::Inference(message.into())
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Byte offset into the expression text, for parse errors.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::Parse(e) => Some(e.offset()),
            _ => None,
        }
    }
}

/// Result type for composer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use dynq_lang::{ParseError, Span};

    #[test]
    fn test_error_display() {
        let err = Error::validation("page size must be at least 1");
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "validation error: page size must be at least 1");

        let err: Error = LangError::from(ParseError::new("unexpected end of input", Span::at(7))).into();
        assert_eq!(err.offset(), Some(7));
        assert_eq!(err.to_string(), "parse error at offset 7: unexpected end of input");
    }
}
