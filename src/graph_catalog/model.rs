use std::collections::{BTreeMap, HashSet};

use super::entity::{Entity, EntityKind};
use super::errors::GraphModelError;

/// Validated entity/relationship model. Read-only once built, so one
/// instance can be shared across concurrent compilations.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphModel {
    entities: BTreeMap<String, Entity>,
}

impl GraphModel {
    /// Build a model, checking structural invariants:
    /// - concrete entities have at least one label
    /// - interfaces and unions have at least one implementation, all concrete
    /// - relationship targets exist and edge-property entities have the right kind
    /// - at most one relay id field per entity
    pub fn new(entities: Vec<Entity>) -> Result<Self, GraphModelError> {
        let mut map = BTreeMap::new();
        for entity in entities {
            if map.contains_key(&entity.name) {
                return Err(GraphModelError::invalid_model_with_context(
                    "duplicate entity name",
                    &entity.name,
                ));
            }
            map.insert(entity.name.clone(), entity);
        }
        let model = GraphModel { entities: map };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), GraphModelError> {
        for entity in self.entities.values() {
            match entity.kind {
                EntityKind::Concrete if entity.labels.is_empty() => {
                    return Err(GraphModelError::invalid_model_with_context(
                        "concrete entity must have at least one label",
                        &entity.name,
                    ));
                }
                EntityKind::Interface | EntityKind::Union => {
                    if entity.implementations.is_empty() {
                        return Err(GraphModelError::invalid_model_with_context(
                            "polymorphic entity must have at least one implementation",
                            &entity.name,
                        ));
                    }
                    for member in &entity.implementations {
                        match self.entities.get(member) {
                            Some(e) if e.is_concrete() => {}
                            _ => {
                                return Err(GraphModelError::invalid_model_with_context(
                                    format!("implementation `{}` is not a concrete entity", member),
                                    &entity.name,
                                ))
                            }
                        }
                    }
                }
                _ => {}
            }

            let mut names = HashSet::new();
            for name in entity
                .fields
                .iter()
                .map(|f| &f.name)
                .chain(entity.relationships.iter().map(|r| &r.name))
            {
                if !names.insert(name) {
                    return Err(GraphModelError::invalid_model_with_context(
                        format!("duplicate field `{}`", name),
                        &entity.name,
                    ));
                }
            }

            if entity.fields.iter().filter(|f| f.relay_id).count() > 1 {
                return Err(GraphModelError::invalid_model_with_context(
                    "at most one relay id field is allowed",
                    &entity.name,
                ));
            }

            if entity.fields.iter().any(|f| f.relay_id && f.name != "id")
                && entity.field("id").is_some()
            {
                return Err(GraphModelError::invalid_model_with_context(
                    "a field named `id` cannot coexist with a relay id field",
                    &entity.name,
                ));
            }

            for field in &entity.fields {
                if let Some(auth) = &field.authorization {
                    if !auth.filter.is_empty() {
                        return Err(GraphModelError::invalid_model_with_context(
                            format!("field `{}` may only carry validate rules", field.name),
                            &entity.name,
                        ));
                    }
                }
            }

            for rel in &entity.relationships {
                if !self.entities.contains_key(&rel.target) {
                    return Err(GraphModelError::invalid_model_with_context(
                        format!(
                            "relationship `{}` targets unknown entity `{}`",
                            rel.name, rel.target
                        ),
                        &entity.name,
                    ));
                }
                if let Some(props) = &rel.properties {
                    match self.entities.get(props) {
                        Some(e) if e.kind == EntityKind::RelationshipProperties => {}
                        _ => {
                            return Err(GraphModelError::invalid_model_with_context(
                                format!(
                                    "relationship `{}` properties `{}` is not a relationship properties entity",
                                    rel.name, props
                                ),
                                &entity.name,
                            ))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn entity(&self, name: &str) -> Result<&Entity, GraphModelError> {
        self.entities
            .get(name)
            .ok_or_else(|| GraphModelError::unknown_entity(name))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Concrete entities an entity stands for: itself when concrete, its
    /// implementations (in declaration order) when polymorphic.
    pub fn concrete_entities<'a>(&'a self, entity: &'a Entity) -> Vec<&'a Entity> {
        if entity.is_polymorphic() {
            entity
                .implementations
                .iter()
                .filter_map(|name| self.entities.get(name))
                .collect()
        } else {
            vec![entity]
        }
    }
}
