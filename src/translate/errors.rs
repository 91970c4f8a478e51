//! # Translation Error Types
//!
//! Every failure of one compilation surfaces as a [`TranslateError`]; no
//! partial query is ever returned alongside it. Lower layers keep their own
//! error enums and convert through `From`.

use serde::Serialize;
use thiserror::Error;

use crate::cypher_builder::CypherBuilderError;
use crate::graph_catalog::GraphModelError;
use crate::utils::GlobalIdError;

/// Stable classification of a [`TranslateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    SchemaMismatch,
    ForbiddenByAuthorization,
    MalformedIdentifier,
    ParameterCollisionExhausted,
    CallbackFailure,
    DepthLimitExceeded,
    Model,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslateError {
    /// Requested field, operator or input shape does not exist on the entity
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Uniform message, never names the rule that failed
    #[error("{0}")]
    ForbiddenByAuthorization(String),

    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(#[from] GlobalIdError),

    #[error("Parameter allocation failed: {0}")]
    ParameterCollisionExhausted(String),

    #[error("Callback `{callback}` failed for field `{field}`: {message}")]
    CallbackFailure {
        callback: String,
        field: String,
        message: String,
    },

    #[error("Nesting depth exceeds the configured limit of {0}")]
    DepthLimitExceeded(u32),

    #[error(transparent)]
    Model(#[from] GraphModelError),
}

impl TranslateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslateError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            TranslateError::ForbiddenByAuthorization(_) => ErrorKind::ForbiddenByAuthorization,
            TranslateError::MalformedIdentifier(_) => ErrorKind::MalformedIdentifier,
            TranslateError::ParameterCollisionExhausted(_) => {
                ErrorKind::ParameterCollisionExhausted
            }
            TranslateError::CallbackFailure { .. } => ErrorKind::CallbackFailure,
            TranslateError::DepthLimitExceeded(_) => ErrorKind::DepthLimitExceeded,
            TranslateError::Model(_) => ErrorKind::Model,
        }
    }

    /// Schema mismatch naming the entity the request was resolved against
    ///
    /// # Example
    /// ```ignore
    /// TranslateError::schema_mismatch_with_context(
    ///     "unknown filter key `titel`",
    ///     "Movie",
    /// )
    /// ```
    pub fn schema_mismatch_with_context(
        message: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        TranslateError::SchemaMismatch(format!("{} (on `{}`)", message.into(), entity.into()))
    }
}

impl From<CypherBuilderError> for TranslateError {
    fn from(err: CypherBuilderError) -> Self {
        match err {
            CypherBuilderError::ParameterCollision(_)
            | CypherBuilderError::ParameterNamesExhausted(_) => {
                TranslateError::ParameterCollisionExhausted(err.to_string())
            }
            // An empty clause only comes from an empty selection or input
            CypherBuilderError::EmptyClause(_) => TranslateError::SchemaMismatch(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_errors_map_to_kinds() {
        let err: TranslateError = CypherBuilderError::ParameterCollision("p".into()).into();
        assert_eq!(err.kind(), ErrorKind::ParameterCollisionExhausted);
        let err: TranslateError = CypherBuilderError::EmptyClause("RETURN").into();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_forbidden_message_is_bare() {
        let err = TranslateError::ForbiddenByAuthorization("Forbidden".into());
        assert_eq!(err.to_string(), "Forbidden");
        assert_eq!(err.kind(), ErrorKind::ForbiddenByAuthorization);
    }

    #[test]
    fn test_schema_mismatch_with_context() {
        let err = TranslateError::schema_mismatch_with_context("unknown field `x`", "Movie");
        assert_eq!(err.to_string(), "Schema mismatch: unknown field `x` (on `Movie`)");
    }
}
