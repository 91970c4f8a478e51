//! Shared fixture model and helpers for the integration tests

use std::sync::Arc;

use async_trait::async_trait;
use graphcypher::{
    CallbackContext, CallbackRegistry, CompiledQuery, CompilerConfig, GraphModelConfig,
    OperationDescriptor, PopulatedByCallback, TranslateError, Translator,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

pub const MODEL_YAML: &str = r#"
entities:
  - name: Movie
    fields:
      - { name: dbId, type: "ID!", relay_id: true, autogenerate: true }
      - { name: title, type: "String!" }
      - { name: released, type: Int }
      - { name: tags, type: "[String!]" }
      - { name: slug, type: String, populated_by: { callback: slug, operations: [CREATE] } }
      - { name: createdAt, type: DateTime, timestamp: [CREATE] }
    relationships:
      - { name: actors, type: ACTED_IN, direction: IN, target: Actor, properties: ActedIn }
      - { name: director, type: DIRECTED, direction: IN, target: Person, cardinality: one }
    authorization:
      validate:
        - operations: [UPDATE]
          when: [BEFORE]
          where: { jwt: { roles_INCLUDES: editor } }
  - name: Actor
    fields:
      - { name: name, type: "String!" }
    relationships:
      - { name: movies, type: ACTED_IN, direction: OUT, target: Movie, properties: ActedIn }
  - name: Person
    fields:
      - { name: name, type: String }
  - name: Series
    fields:
      - { name: title, type: "String!" }
      - { name: episodes, type: Int }
  - name: Production
    kind: interface
    fields:
      - { name: title, type: "String!" }
    implementations: [Movie, Series]
  - name: Post
    fields:
      - { name: owner, type: String }
      - { name: body, type: String }
    authorization:
      filter:
        - operations: [READ]
          where: { node: { owner: "$jwt.sub" } }
  - name: Draft
    fields:
      - { name: title, type: String }
    authorization:
      validate:
        - operations: [READ]
          where: { jwt: { roles_INCLUDES: admin } }
        - operations: [CREATE]
          when: [AFTER]
          where: { jwt: { roles_INCLUDES: admin } }
  - name: ActedIn
    kind: relationship_properties
    fields:
      - { name: role, type: String }
      - { name: screenTime, type: Int }
"#;

lazy_static! {
    static ref PARAM_REFERENCE: Regex = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Slug callback deriving its value from the entity name
pub struct EntitySlug;

#[async_trait]
impl PopulatedByCallback for EntitySlug {
    async fn populate(&self, context: &CallbackContext) -> anyhow::Result<Value> {
        Ok(json!(format!("{}-slug", context.entity.to_lowercase())))
    }
}

pub fn translator(config: CompilerConfig) -> Translator {
    let model = GraphModelConfig::from_yaml_str(MODEL_YAML)
        .unwrap()
        .build()
        .unwrap();
    Translator::new(Arc::new(model), config)
        .with_callbacks(CallbackRegistry::new().with("slug", Arc::new(EntitySlug)))
}

pub fn descriptor(value: Value) -> OperationDescriptor {
    serde_json::from_value(value).unwrap()
}

pub async fn compile(value: Value) -> Result<CompiledQuery, TranslateError> {
    translator(CompilerConfig::default())
        .translate(&descriptor(value))
        .await
}

/// Every `$name` the text refers to is bound, `jwt` included.
pub fn assert_params_bound(query: &CompiledQuery) {
    for captures in PARAM_REFERENCE.captures_iter(&query.cypher) {
        let name = &captures[1];
        assert!(
            query.params.contains_key(name),
            "`${}` is not bound in:\n{}",
            name,
            query.cypher
        );
    }
}
