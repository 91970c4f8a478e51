//! Populated-by callbacks.
//!
//! Fields declared with `populated_by` get their value from a named
//! [`PopulatedByCallback`]. All callbacks of an operation are awaited in a
//! pre-pass over the typed input, so the Cypher builders stay synchronous.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::errors::TranslateError;
use super::mutation_input::{NodeInput, NodeUpdate, PropertyInput};
use super::operation::JwtClaims;
use crate::graph_catalog::{Entity, Field, FieldGeneration, MutationKind, ScalarType};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a callback is asked to populate.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackContext {
    pub entity: String,
    pub field: String,
    pub operation: MutationKind,
    pub claims: Option<JwtClaims>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PopulatedByCallback: Send + Sync {
    async fn populate(&self, context: &CallbackContext) -> anyhow::Result<Value>;
}

/// Callbacks by the name fields refer to them with.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Arc<dyn PopulatedByCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, callback: Arc<dyn PopulatedByCallback>) {
        self.callbacks.insert(name.into(), callback);
    }

    pub fn with(mut self, name: impl Into<String>, callback: Arc<dyn PopulatedByCallback>) -> Self {
        self.register(name, callback);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PopulatedByCallback>> {
        self.callbacks.get(name)
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.callbacks.keys().collect();
        names.sort();
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &names)
            .finish()
    }
}

fn scalar_matches(scalar: ScalarType, value: &Value) -> bool {
    match scalar {
        ScalarType::Int | ScalarType::BigInt => value.is_i64() || value.is_u64(),
        ScalarType::Float => value.is_number(),
        ScalarType::Boolean => value.is_boolean(),
        ScalarType::Point | ScalarType::CartesianPoint => value.is_object(),
        _ => value.is_string(),
    }
}

fn value_matches(field: &Field, value: &Value) -> bool {
    if value.is_null() {
        return !field.field_type.required;
    }
    if field.is_list() {
        return value
            .as_array()
            .map(|items| items.iter().all(|v| scalar_matches(field.scalar(), v)))
            .unwrap_or(false);
    }
    scalar_matches(field.scalar(), value)
}

/// Awaits every callback an input needs and stores the results in it.
pub(crate) struct Populator<'a> {
    registry: &'a CallbackRegistry,
    claims: Option<&'a JwtClaims>,
}

impl<'a> Populator<'a> {
    pub(crate) fn new(registry: &'a CallbackRegistry, claims: Option<&'a JwtClaims>) -> Self {
        Populator { registry, claims }
    }

    async fn value(
        &self,
        entity: &Entity,
        field: &Field,
        callback: &str,
        operation: MutationKind,
    ) -> Result<Value, TranslateError> {
        let failure = |message: String| TranslateError::CallbackFailure {
            callback: callback.to_string(),
            field: format!("{}.{}", entity.name, field.name),
            message,
        };
        let registered = self
            .registry
            .get(callback)
            .ok_or_else(|| failure("no callback registered under this name".to_string()))?;
        let context = CallbackContext {
            entity: entity.name.clone(),
            field: field.name.clone(),
            operation,
            claims: self.claims.cloned(),
        };
        debug!("Awaiting callback `{}` for {}.{}", callback, entity.name, field.name);
        let value = registered
            .populate(&context)
            .await
            .map_err(|e| failure(e.to_string()))?;
        if !value_matches(field, &value) {
            return Err(failure(format!(
                "returned {} for a field of type {}",
                value,
                field.scalar()
            )));
        }
        Ok(value)
    }

    async fn populated_fields<'m>(
        &self,
        entity: &'m Entity,
        operation: MutationKind,
    ) -> Result<Vec<PropertyInput<'m>>, TranslateError> {
        let mut values = Vec::new();
        for field in &entity.fields {
            if let FieldGeneration::PopulatedBy {
                callback,
                operations,
            } = &field.generation
            {
                if operations.contains(&operation) {
                    let value = self.value(entity, field, callback, operation).await?;
                    values.push(PropertyInput { field, value });
                }
            }
        }
        Ok(values)
    }

    /// A node to create, its edge inputs and everything created below it.
    pub(crate) fn populate_create<'s, 'm>(
        &'s self,
        node: &'s mut NodeInput<'m>,
    ) -> BoxFuture<'s, Result<(), TranslateError>> {
        Box::pin(async move {
            let populated = self.populated_fields(node.entity, MutationKind::Create).await?;
            node.populated.extend(populated);
            for relationship in &mut node.relationships {
                for create in &mut relationship.create {
                    self.populate_create(&mut create.node).await?;
                    if let Some(edge) = &mut create.edge {
                        self.populate_create(edge).await?;
                    }
                }
                for connect in &mut relationship.connect {
                    if let Some(edge) = &mut connect.edge {
                        self.populate_create(edge).await?;
                    }
                }
            }
            Ok(())
        })
    }

    /// A matched node being updated and its nested operations.
    pub(crate) fn populate_update<'s, 'm>(
        &'s self,
        update: &'s mut NodeUpdate<'m>,
    ) -> BoxFuture<'s, Result<(), TranslateError>> {
        Box::pin(async move {
            let populated = self.populated_fields(update.entity, MutationKind::Update).await?;
            update.populated.extend(populated);
            for relationship in &mut update.relationships {
                if let Some(node) = &mut relationship.update_node {
                    self.populate_update(node).await?;
                }
                if let Some(edge) = &mut relationship.update_edge {
                    self.populate_update(edge).await?;
                }
                for create in &mut relationship.create {
                    self.populate_create(&mut create.node).await?;
                    if let Some(edge) = &mut create.edge {
                        self.populate_create(edge).await?;
                    }
                }
                for connect in &mut relationship.connect {
                    if let Some(edge) = &mut connect.edge {
                        self.populate_create(edge).await?;
                    }
                }
            }
            Ok(())
        })
    }
}
