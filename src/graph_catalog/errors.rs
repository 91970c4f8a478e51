//! # Graph Model Error Types
//!
//! Errors raised while loading an entity/relationship model from YAML and
//! while validating its structural invariants. Lookups made by the translator
//! at compile time use the same enum so that a missing entity surfaces with
//! the name that was asked for.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphModelError {
    #[error("No entity named `{name}` in the graph model")]
    UnknownEntity { name: String },
    #[error("Entity `{entity}` has no field `{field}`")]
    UnknownField { entity: String, field: String },
    #[error("Invalid field type `{type_string}`")]
    InvalidFieldType { type_string: String },
    #[error("Failed to read model file: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse model: {error}")]
    ConfigParseError { error: String },
    #[error("Invalid model: {message}")]
    InvalidModel { message: String },
}

impl GraphModelError {
    /// Create an InvalidModel error naming the entity it was raised for
    ///
    /// # Example
    /// ```ignore
    /// GraphModelError::invalid_model_with_context(
    ///     "interface has no implementations",
    ///     "Production",
    /// )
    /// ```
    pub fn invalid_model_with_context(
        message: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        GraphModelError::InvalidModel {
            message: format!("{}\n  Entity: {}", message.into(), entity.into()),
        }
    }

    pub fn unknown_entity(name: impl Into<String>) -> Self {
        GraphModelError::UnknownEntity { name: name.into() }
    }
}
