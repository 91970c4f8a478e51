//! graphcypher - declarative graph operations compiled to Neo4j Cypher
//!
//! This crate turns read, connection, aggregate, node, create, update and
//! delete operations over an entity/relationship model into parameterized
//! Cypher through:
//! - A YAML-loaded graph model with authorization annotations
//! - A small Cypher AST with a per-operation parameter environment
//! - Predicate, projection and mutation builders
//! - Relay-style global ids and connection cursors

pub mod config;
pub mod cypher_builder;
pub mod graph_catalog;
pub mod translate;
pub mod utils;

pub use config::{CompilerConfig, ConfigError};
pub use graph_catalog::{GraphModel, GraphModelConfig, GraphModelError};
pub use translate::{
    CallbackContext, CallbackRegistry, CompiledQuery, ErrorKind, Operation, OperationDescriptor,
    PopulatedByCallback, ResultShape, TranslateError, Translator,
};
