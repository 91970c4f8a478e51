//! YAML definition of a graph model.
//!
//! ```yaml
//! entities:
//!   - name: Movie
//!     fields:
//!       - { name: id, type: "ID!", relay_id: true, autogenerate: true }
//!       - { name: title, type: "String!" }
//!       - { name: createdAt, type: DateTime, timestamp: [CREATE] }
//!     relationships:
//!       - { name: actors, type: ACTED_IN, direction: IN, target: Actor, properties: ActedIn }
//! ```
//!
//! `build()` resolves the declarative flags into typed model values and
//! validates the result.

use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::authorization::AuthorizationAnnotation;
use super::entity::{
    Cardinality, Entity, EntityKind, Field, FieldGeneration, FieldType, MutationKind,
    RelationshipDirection, RelationshipField,
};
use super::errors::GraphModelError;
use super::model::GraphModel;

lazy_static! {
    static ref NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphModelConfig {
    pub entities: Vec<EntityDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    /// Defaults to `[name]` for concrete entities
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
    #[serde(default)]
    pub authorization: Option<AuthorizationAnnotation>,
    #[serde(default)]
    pub implementations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulatedByDefinition {
    pub callback: String,
    #[serde(default = "create_and_update")]
    pub operations: Vec<MutationKind>,
}

fn create_and_update() -> Vec<MutationKind> {
    vec![MutationKind::Create, MutationKind::Update]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_string: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub relay_id: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub autogenerate: bool,
    #[serde(default)]
    pub timestamp: Option<Vec<MutationKind>>,
    #[serde(default)]
    pub populated_by: Option<PopulatedByDefinition>,
    #[serde(default)]
    pub authorization: Option<AuthorizationAnnotation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub direction: RelationshipDirection,
    pub target: String,
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub required: bool,
}

fn check_name(name: &str, entity: &str) -> Result<(), GraphModelError> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(GraphModelError::invalid_model_with_context(
            format!("`{}` is not a valid name", name),
            entity,
        ))
    }
}

impl FieldDefinition {
    /// Resolve the generation flags. At most one may be set.
    fn generation(&self, entity: &str) -> Result<FieldGeneration, GraphModelError> {
        let set = [
            self.autogenerate,
            self.timestamp.is_some(),
            self.populated_by.is_some(),
        ]
        .iter()
        .filter(|flag| **flag)
        .count();
        if set > 1 {
            return Err(GraphModelError::invalid_model_with_context(
                format!(
                    "field `{}` declares more than one of autogenerate, timestamp, populated_by",
                    self.name
                ),
                entity,
            ));
        }
        if self.autogenerate {
            return Ok(FieldGeneration::Autogenerate);
        }
        if let Some(operations) = &self.timestamp {
            let operations = if operations.is_empty() {
                create_and_update()
            } else {
                operations.clone()
            };
            return Ok(FieldGeneration::Timestamp { operations });
        }
        if let Some(populated) = &self.populated_by {
            return Ok(FieldGeneration::PopulatedBy {
                callback: populated.callback.clone(),
                operations: populated.operations.clone(),
            });
        }
        Ok(FieldGeneration::Plain)
    }

    fn build(&self, entity: &str) -> Result<Field, GraphModelError> {
        check_name(&self.name, entity)?;
        let field_type: FieldType = self.type_string.parse()?;
        let generation = self.generation(entity)?;
        if matches!(generation, FieldGeneration::Timestamp { .. })
            && field_type.scalar.timestamp_function().is_none()
        {
            return Err(GraphModelError::invalid_model_with_context(
                format!("timestamp field `{}` must have a date or time type", self.name),
                entity,
            ));
        }
        Ok(Field {
            name: self.name.clone(),
            field_type,
            alias: self.alias.clone(),
            generation,
            relay_id: self.relay_id,
            unique: self.unique,
            default: self.default.clone(),
            authorization: self.authorization.clone(),
        })
    }
}

impl RelationshipDefinition {
    fn build(&self, entity: &str) -> Result<RelationshipField, GraphModelError> {
        check_name(&self.name, entity)?;
        if self.required && self.cardinality == Cardinality::Many {
            return Err(GraphModelError::invalid_model_with_context(
                format!("only singular relationships can be required (`{}`)", self.name),
                entity,
            ));
        }
        Ok(RelationshipField {
            name: self.name.clone(),
            rel_type: self.rel_type.clone(),
            direction: self.direction,
            target: self.target.clone(),
            properties: self.properties.clone(),
            cardinality: self.cardinality,
            required: self.required,
        })
    }
}

impl EntityDefinition {
    fn build(&self) -> Result<Entity, GraphModelError> {
        check_name(&self.name, &self.name)?;
        let labels = match (&self.labels, self.kind) {
            (Some(labels), _) => labels.clone(),
            (None, EntityKind::Concrete) => vec![self.name.clone()],
            (None, _) => vec![],
        };
        Ok(Entity {
            name: self.name.clone(),
            kind: self.kind,
            labels,
            fields: self
                .fields
                .iter()
                .map(|f| f.build(&self.name))
                .collect::<Result<_, _>>()?,
            relationships: self
                .relationships
                .iter()
                .map(|r| r.build(&self.name))
                .collect::<Result<_, _>>()?,
            authorization: self.authorization.clone(),
            implementations: self.implementations.clone(),
        })
    }
}

impl GraphModelConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, GraphModelError> {
        let contents = fs::read_to_string(path).map_err(|e| GraphModelError::ConfigReadError {
            error: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, GraphModelError> {
        serde_yaml::from_str(yaml).map_err(|e| GraphModelError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Resolve into a validated [`GraphModel`].
    pub fn build(&self) -> Result<GraphModel, GraphModelError> {
        if self.entities.is_empty() {
            return Err(GraphModelError::InvalidModel {
                message: "model must contain at least one entity".to_string(),
            });
        }
        let entities = self
            .entities
            .iter()
            .map(|e| e.build())
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("Built graph model with {} entities", entities.len());
        GraphModel::new(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::entity::ScalarType;
    use std::io::Write;

    const MODEL: &str = r#"
entities:
  - name: Movie
    fields:
      - { name: id, type: "ID!", relay_id: true, autogenerate: true }
      - { name: title, type: "String!" }
      - { name: createdAt, type: DateTime, timestamp: [CREATE] }
    relationships:
      - { name: actors, type: ACTED_IN, direction: IN, target: Actor }
  - name: Actor
    labels: [Actor, Person]
    fields:
      - { name: name, type: String }
"#;

    #[test]
    fn test_build_resolves_generation_modes() {
        let model = GraphModelConfig::from_yaml_str(MODEL).unwrap().build().unwrap();
        let movie = model.entity("Movie").unwrap();
        assert_eq!(movie.labels, vec!["Movie"]);
        assert_eq!(movie.field("id").unwrap().generation, FieldGeneration::Autogenerate);
        assert_eq!(
            movie.field("createdAt").unwrap().generation,
            FieldGeneration::Timestamp {
                operations: vec![MutationKind::Create]
            }
        );
        assert_eq!(movie.field("title").unwrap().scalar(), ScalarType::String);
        assert_eq!(movie.relay_id_field().unwrap().name, "id");
        assert_eq!(model.entity("Actor").unwrap().labels, vec!["Actor", "Person"]);
    }

    #[test]
    fn test_conflicting_generation_flags_rejected() {
        let yaml = r#"
entities:
  - name: Movie
    fields:
      - { name: id, type: ID, autogenerate: true, populated_by: { callback: slug } }
"#;
        let err = GraphModelConfig::from_yaml_str(yaml).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let yaml = "entities:\n  - name: \"Bad Name\"\n";
        let err = GraphModelConfig::from_yaml_str(yaml).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("not a valid name"));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MODEL.as_bytes()).unwrap();
        let config = GraphModelConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.entities.len(), 2);
    }
}
