//! Entity/relationship model consumed by the translator.

pub mod authorization;
pub mod config;
pub mod entity;
pub mod errors;
pub mod model;

pub use authorization::{
    AuthorizationAnnotation, AuthorizationOperation, AuthorizationRule, AuthorizationTiming,
    AuthorizationWhere,
};
pub use config::GraphModelConfig;
pub use entity::{
    Cardinality, Entity, EntityKind, Field, FieldGeneration, FieldType, MutationKind,
    RelationshipDirection, RelationshipField, ScalarType,
};
pub use errors::GraphModelError;
pub use model::GraphModel;
