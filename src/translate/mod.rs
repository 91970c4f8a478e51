//! Operation translator.
//!
//! [`Translator::translate`] turns one [`OperationDescriptor`] into a
//! [`CompiledQuery`]. Every call gets its own naming environment, so
//! compiling the same descriptor twice yields byte-identical output.

use std::sync::Arc;

use log::{debug, trace};
use serde_json::Value;

use crate::config::CompilerConfig;
use crate::cypher_builder::Statement;
use crate::graph_catalog::GraphModel;

pub mod aggregate_where;
pub mod aggregation;
pub mod authorization;
pub mod batch_create;
pub mod callbacks;
pub mod connection;
pub mod context;
pub mod create;
pub mod delete;
pub mod errors;
pub mod global_node;
pub mod mutation_input;
pub mod operation;
pub mod predicate;
pub mod projection;
pub mod read;
pub mod relationship_ops;
pub mod set_properties;
pub mod shape;
pub mod sort;
pub mod traversal;
pub mod update;
pub mod where_input;

pub use callbacks::{CallbackContext, CallbackRegistry, PopulatedByCallback};
pub use errors::{ErrorKind, TranslateError};
pub use operation::{CompiledQuery, Operation, OperationDescriptor, OperationOrigin};
pub use shape::ResultShape;

use callbacks::Populator;
use context::TranslateContext;
use mutation_input::{parse_delete_input, parse_node_input, parse_node_update};
use where_input::parse_where;

/// Compiles operations against one model and configuration.
#[derive(Debug, Clone)]
pub struct Translator {
    model: Arc<GraphModel>,
    config: CompilerConfig,
    callbacks: CallbackRegistry,
}

impl Translator {
    pub fn new(model: Arc<GraphModel>, config: CompilerConfig) -> Self {
        Translator {
            model,
            config,
            callbacks: CallbackRegistry::default(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: CallbackRegistry) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub async fn translate(
        &self,
        descriptor: &OperationDescriptor,
    ) -> Result<CompiledQuery, TranslateError> {
        let operation = &descriptor.operation;
        debug!("Translating {} operation", operation.name());
        let mut ctx = TranslateContext::new(
            &self.model,
            &self.config,
            descriptor.claims.clone(),
            descriptor.origin.clone(),
        )?;
        let populator = Populator::new(&self.callbacks, descriptor.claims.as_ref());

        let (statement, shape) = match operation {
            Operation::Read(read) => {
                let (statement, shape) = read::read(&mut ctx, read)?;
                (statement, Some(shape))
            }
            Operation::Connection(connection) => {
                let (statement, shape) = read::connection(&mut ctx, connection)?;
                (statement, Some(shape))
            }
            Operation::Aggregate(aggregate) => {
                let (statement, shape) = read::aggregate(&mut ctx, aggregate)?;
                (statement, Some(shape))
            }
            Operation::Node(node) => {
                let (statement, shape) = global_node::global_node(&mut ctx, node)?;
                (statement, Some(shape))
            }
            Operation::Create(create) => {
                let entity = self.model.entity(&create.entity)?;
                let mut inputs = Vec::with_capacity(create.input.len());
                for row in &create.input {
                    inputs.push(parse_node_input(&ctx, entity, &Value::Object(row.clone()), 1)?);
                }
                for input in &mut inputs {
                    populator.populate_create(input).await?;
                }
                let (statement, shape) =
                    create::create(&mut ctx, entity, &inputs, &create.selection)?;
                (statement, Some(shape))
            }
            Operation::Update(update) => {
                let entity = self.model.entity(&update.entity)?;
                let filter = match &update.where_input {
                    Some(input) => Some(parse_where(&ctx, entity, input, 1)?),
                    None => None,
                };
                let mut parsed = parse_node_update(&ctx, entity, &update.update, 1)?;
                populator.populate_update(&mut parsed).await?;
                let (statement, shape) = update::update(
                    &mut ctx,
                    entity,
                    filter.as_ref(),
                    &parsed,
                    &update.selection,
                )?;
                (statement, Some(shape))
            }
            Operation::Delete(delete) => {
                let entity = self.model.entity(&delete.entity)?;
                let filter = match &delete.where_input {
                    Some(input) => Some(parse_where(&ctx, entity, input, 1)?),
                    None => None,
                };
                let nested = parse_delete_input(&ctx, entity, &delete.delete, 1)?;
                let statement = delete::delete(&mut ctx, entity, filter.as_ref(), &nested)?;
                (statement, None)
            }
        };
        finish(statement, shape)
    }
}

fn finish(
    statement: Statement,
    shape: Option<ResultShape>,
) -> Result<CompiledQuery, TranslateError> {
    let built = statement.build()?;
    trace!("Compiled Cypher:\n{}", built.cypher);
    Ok(CompiledQuery {
        cypher: built.cypher,
        params: built.params,
        shape,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::GraphModelConfig;
    use serde_json::json;

    fn translator() -> Translator {
        let model = GraphModelConfig::from_yaml_str(
            r#"
entities:
  - name: Movie
    fields:
      - { name: title, type: String }
"#,
        )
        .unwrap()
        .build()
        .unwrap();
        Translator::new(Arc::new(model), CompilerConfig::default())
    }

    fn descriptor(value: Value) -> OperationDescriptor {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_translate_read() {
        let query = translator()
            .translate(&descriptor(json!({
                "operation": { "kind": "read", "entity": "Movie", "selection": ["title"] }
            })))
            .await
            .unwrap();
        assert_eq!(query.cypher, "MATCH (this:Movie)\nRETURN this { .title } AS this");
        assert!(query.params.is_empty());
        assert_eq!(query.shape.unwrap().column, "this");
    }

    #[tokio::test]
    async fn test_delete_has_no_shape() {
        let query = translator()
            .translate(&descriptor(json!({
                "operation": { "kind": "delete", "entity": "Movie", "where": { "title": "Up" } }
            })))
            .await
            .unwrap();
        assert_eq!(
            query.cypher,
            "MATCH (this:Movie)\nWHERE this.title = $this_title\nDETACH DELETE this"
        );
        assert!(query.shape.is_none());
    }

    #[tokio::test]
    async fn test_unknown_entity_is_reported() {
        let err = translator()
            .translate(&descriptor(json!({
                "operation": { "kind": "read", "entity": "Film", "selection": ["title"] }
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Model);
    }
}
