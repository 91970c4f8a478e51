//! Typed mutation inputs.
//!
//! Raw create/update/delete JSON is parsed against the model before any
//! Cypher is built: unknown keys and generated fields are rejected, declared
//! defaults are filled in for creates, and inputs for interfaces and unions
//! are resolved to the implementation they name.

use serde_json::{Map, Value};

use super::context::TranslateContext;
use super::errors::TranslateError;
use super::where_input::{parse_connection_where_on, parse_where, ConnectionFilter, FilterExpr};
use crate::graph_catalog::{Entity, EntityKind, Field, RelationshipField, ScalarType};

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInput<'m> {
    pub field: &'m Field,
    pub value: Value,
}

/// Properties and nested operations for one node (or edge) to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInput<'m> {
    pub entity: &'m Entity,
    /// Supplied values followed by defaults for fields left out
    pub properties: Vec<PropertyInput<'m>>,
    /// Values produced by populated-by callbacks
    pub populated: Vec<PropertyInput<'m>>,
    pub relationships: Vec<RelationshipInput<'m>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipInput<'m> {
    pub relationship: &'m RelationshipField,
    pub create: Vec<NestedCreate<'m>>,
    pub connect: Vec<ConnectInput<'m>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedCreate<'m> {
    pub node: NodeInput<'m>,
    /// Present whenever the relationship has edge properties
    pub edge: Option<NodeInput<'m>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectInput<'m> {
    /// Concrete member, or the interface itself
    pub target: &'m Entity,
    pub filter: Option<FilterExpr<'m>>,
    pub edge: Option<NodeInput<'m>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Set,
    Increment,
    Decrement,
    Add,
    Subtract,
    Multiply,
    Divide,
    Push,
    Pop,
}

const UPDATE_SUFFIXES: &[(&str, UpdateOperator)] = &[
    ("_INCREMENT", UpdateOperator::Increment),
    ("_DECREMENT", UpdateOperator::Decrement),
    ("_SUBTRACT", UpdateOperator::Subtract),
    ("_MULTIPLY", UpdateOperator::Multiply),
    ("_DIVIDE", UpdateOperator::Divide),
    ("_PUSH", UpdateOperator::Push),
    ("_ADD", UpdateOperator::Add),
    ("_POP", UpdateOperator::Pop),
];

impl UpdateOperator {
    pub fn suffix(&self) -> &'static str {
        UPDATE_SUFFIXES
            .iter()
            .find(|(_, op)| op == self)
            .map(|(suffix, _)| *suffix)
            .unwrap_or("")
    }

    fn accepts(&self, field: &Field) -> bool {
        let scalar = field.scalar();
        match self {
            UpdateOperator::Set => true,
            UpdateOperator::Increment | UpdateOperator::Decrement => {
                !field.is_list() && matches!(scalar, ScalarType::Int | ScalarType::BigInt)
            }
            UpdateOperator::Add
            | UpdateOperator::Subtract
            | UpdateOperator::Multiply
            | UpdateOperator::Divide => {
                !field.is_list() && scalar == ScalarType::Float
            }
            UpdateOperator::Push | UpdateOperator::Pop => field.is_list(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate<'m> {
    pub field: &'m Field,
    pub operator: UpdateOperator,
    pub value: Value,
}

/// Changes to one matched node (or edge).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate<'m> {
    pub entity: &'m Entity,
    pub fields: Vec<FieldUpdate<'m>>,
    pub populated: Vec<PropertyInput<'m>>,
    pub relationships: Vec<RelationshipUpdate<'m>>,
}

impl NodeUpdate<'_> {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.populated.is_empty() && self.relationships.is_empty()
    }
}

/// One entry of a relationship field in an update input.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipUpdate<'m> {
    pub relationship: &'m RelationshipField,
    /// Concrete member for unions, the declared target otherwise
    pub target: &'m Entity,
    /// Restricts `update`
    pub filter: Option<ConnectionFilter<'m>>,
    pub update_node: Option<NodeUpdate<'m>>,
    pub update_edge: Option<NodeUpdate<'m>>,
    pub connect: Vec<ConnectInput<'m>>,
    pub disconnect: Vec<Option<ConnectionFilter<'m>>>,
    pub create: Vec<NestedCreate<'m>>,
    pub delete: Vec<NestedDelete<'m>>,
}

/// Related nodes to delete, with deletes nested below them.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedDelete<'m> {
    pub relationship: &'m RelationshipField,
    pub target: &'m Entity,
    pub filter: Option<ConnectionFilter<'m>>,
    pub nested: Vec<NestedDelete<'m>>,
}

fn mismatch(message: String, entity: &Entity) -> TranslateError {
    TranslateError::schema_mismatch_with_context(message, &entity.name)
}

fn as_object<'v>(
    value: &'v Value,
    key: &str,
    entity: &Entity,
) -> Result<&'v Map<String, Value>, TranslateError> {
    value
        .as_object()
        .ok_or_else(|| mismatch(format!("`{}` expects an object", key), entity))
}

/// A single object or a list of them.
fn one_or_many(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn settable<'m>(entity: &'m Entity, key: &str) -> Result<Option<&'m Field>, TranslateError> {
    let Some(field) = entity.field(key) else {
        return Ok(None);
    };
    if field.generation.is_generated() {
        return Err(mismatch(
            format!("field `{}` is generated and cannot be set", key),
            entity,
        ));
    }
    Ok(Some(field))
}

/// Members a nested input may be keyed by: every implementation for unions,
/// only the entity itself otherwise.
fn members<'m>(ctx: &TranslateContext<'m>, target: &'m Entity) -> Vec<&'m Entity> {
    if target.kind == EntityKind::Union {
        ctx.model.concrete_entities(target)
    } else {
        vec![target]
    }
}

/// Resolve an input for `target` to a concrete entity and its fields:
/// interfaces and unions take `{ "Member": {..} }`.
fn concrete_input<'m, 'v>(
    ctx: &TranslateContext<'m>,
    target: &'m Entity,
    value: &'v Value,
) -> Result<(&'m Entity, &'v Value), TranslateError> {
    if target.is_concrete() {
        return Ok((target, value));
    }
    let object = as_object(value, "node", target)?;
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((name, inner)), None) => {
            let member = ctx
                .model
                .concrete_entities(target)
                .into_iter()
                .find(|m| &m.name == name)
                .ok_or_else(|| {
                    mismatch(format!("`{}` is not an implementation", name), target)
                })?;
            Ok((member, inner))
        }
        _ => Err(mismatch(
            "input must name exactly one implementation".to_string(),
            target,
        )),
    }
}

/// Parse a node to create. `value` may be `null` for a node with only
/// defaults and generated values.
pub fn parse_node_input<'m>(
    ctx: &TranslateContext<'m>,
    entity: &'m Entity,
    value: &Value,
    depth: u32,
) -> Result<NodeInput<'m>, TranslateError> {
    ctx.check_depth(depth)?;
    let empty = Map::new();
    let object = match value {
        Value::Null => &empty,
        other => as_object(other, &entity.name, entity)?,
    };
    let mut input = NodeInput {
        entity,
        properties: Vec::new(),
        populated: Vec::new(),
        relationships: Vec::new(),
    };
    for (key, value) in object {
        if let Some(field) = settable(entity, key)? {
            input.properties.push(PropertyInput {
                field,
                value: value.clone(),
            });
        } else if let Some(rel) = entity.relationship(key) {
            input
                .relationships
                .push(parse_relationship_input(ctx, rel, value, depth + 1)?);
        } else {
            return Err(mismatch(format!("unknown input field `{}`", key), entity));
        }
    }
    for field in &entity.fields {
        if let Some(default) = &field.default {
            if !object.contains_key(&field.name) {
                input.properties.push(PropertyInput {
                    field,
                    value: default.clone(),
                });
            }
        }
    }
    Ok(input)
}

fn parse_edge_input<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    value: Option<&Value>,
    depth: u32,
) -> Result<Option<NodeInput<'m>>, TranslateError> {
    match (&relationship.properties, value) {
        (Some(name), value) => {
            let entity = ctx.model.entity(name)?;
            let edge = parse_node_input(ctx, entity, value.unwrap_or(&NULL), depth)?;
            if !edge.relationships.is_empty() {
                return Err(mismatch("edges cannot have relationships".to_string(), entity));
            }
            Ok(Some(edge))
        }
        (None, Some(_)) => Err(TranslateError::SchemaMismatch(format!(
            "relationship `{}` has no edge properties",
            relationship.name
        ))),
        (None, None) => Ok(None),
    }
}

/// `{ node, edge }`
pub fn parse_nested_create<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    target: &'m Entity,
    value: &Value,
    depth: u32,
) -> Result<NestedCreate<'m>, TranslateError> {
    let object = as_object(value, "create", target)?;
    for key in object.keys() {
        if key != "node" && key != "edge" {
            return Err(mismatch(format!("unknown create key `{}`", key), target));
        }
    }
    let (entity, raw_node) = concrete_input(ctx, target, object.get("node").unwrap_or(&NULL))?;
    Ok(NestedCreate {
        node: parse_node_input(ctx, entity, raw_node, depth)?,
        edge: parse_edge_input(ctx, relationship, object.get("edge"), depth)?,
    })
}

/// `{ where: { node: {..} }, edge: {..} }`
pub fn parse_connect<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    target: &'m Entity,
    value: &Value,
    depth: u32,
) -> Result<ConnectInput<'m>, TranslateError> {
    let object = as_object(value, "connect", target)?;
    let mut filter = None;
    for (key, value) in object {
        match key.as_str() {
            "where" => {
                let condition = as_object(value, key, target)?;
                for (k, v) in condition {
                    if k != "node" {
                        return Err(mismatch(format!("connect can only filter on `node`, not `{}`", k), target));
                    }
                    filter = Some(parse_where(ctx, target, as_object(v, k, target)?, depth + 1)?);
                }
            }
            "edge" => {}
            other => return Err(mismatch(format!("unknown connect key `{}`", other), target)),
        }
    }
    Ok(ConnectInput {
        target,
        filter,
        edge: parse_edge_input(ctx, relationship, object.get("edge"), depth)?,
    })
}

/// `{ create: [..], connect: [..] }`, keyed by member name for unions.
pub fn parse_relationship_input<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    value: &Value,
    depth: u32,
) -> Result<RelationshipInput<'m>, TranslateError> {
    ctx.check_depth(depth)?;
    let target = ctx.model.entity(&relationship.target)?;
    let mut input = RelationshipInput {
        relationship,
        create: Vec::new(),
        connect: Vec::new(),
    };
    for (member, value) in keyed_by_member(ctx, target, value, &relationship.name)? {
        let object = as_object(value, &relationship.name, member)?;
        for (key, value) in object {
            match key.as_str() {
                "create" => {
                    for item in one_or_many(value) {
                        input
                            .create
                            .push(parse_nested_create(ctx, relationship, member, item, depth)?);
                    }
                }
                "connect" => {
                    for item in one_or_many(value) {
                        input
                            .connect
                            .push(parse_connect(ctx, relationship, member, item, depth)?);
                    }
                }
                other => {
                    return Err(mismatch(
                        format!("unknown relationship operation `{}`", other),
                        member,
                    ))
                }
            }
        }
    }
    Ok(input)
}

/// Unions key nested inputs by member; other targets take the input as is.
fn keyed_by_member<'m, 'v>(
    ctx: &TranslateContext<'m>,
    target: &'m Entity,
    value: &'v Value,
    key: &str,
) -> Result<Vec<(&'m Entity, &'v Value)>, TranslateError> {
    if target.kind != EntityKind::Union {
        return Ok(vec![(target, value)]);
    }
    let object = as_object(value, key, target)?;
    let members = members(ctx, target);
    object
        .iter()
        .map(|(name, value)| {
            members
                .iter()
                .find(|m| &m.name == name)
                .map(|m| (*m, value))
                .ok_or_else(|| mismatch(format!("`{}` is not a member", name), target))
        })
        .collect()
}

fn parse_where_on<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    target: &'m Entity,
    value: Option<&Value>,
    depth: u32,
) -> Result<Option<ConnectionFilter<'m>>, TranslateError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(parse_connection_where_on(
            ctx,
            relationship,
            target,
            as_object(value, "where", target)?,
            depth + 1,
        )?)),
    }
}

/// Parse the `update` input of an update operation.
pub fn parse_node_update<'m>(
    ctx: &TranslateContext<'m>,
    entity: &'m Entity,
    input: &Map<String, Value>,
    depth: u32,
) -> Result<NodeUpdate<'m>, TranslateError> {
    ctx.check_depth(depth)?;
    let mut update = NodeUpdate {
        entity,
        fields: Vec::new(),
        populated: Vec::new(),
        relationships: Vec::new(),
    };
    for (key, value) in input {
        if let Some(field) = settable(entity, key)? {
            update.fields.push(FieldUpdate {
                field,
                operator: UpdateOperator::Set,
                value: value.clone(),
            });
            continue;
        }
        if let Some(rel) = entity.relationship(key) {
            update
                .relationships
                .extend(parse_relationship_updates(ctx, rel, value, depth + 1)?);
            continue;
        }
        let matched = UPDATE_SUFFIXES.iter().find_map(|(suffix, op)| {
            key.strip_suffix(suffix)
                .and_then(|name| entity.field(name))
                .map(|field| (field, *op))
        });
        let Some((field, operator)) = matched else {
            return Err(mismatch(format!("unknown update key `{}`", key), entity));
        };
        settable(entity, &field.name)?;
        if !operator.accepts(field) {
            return Err(mismatch(
                format!("`{}` is not valid for a {} field", key, field.scalar()),
                entity,
            ));
        }
        if value.is_null() {
            return Err(mismatch(format!("`{}` does not accept null", key), entity));
        }
        update.fields.push(FieldUpdate {
            field,
            operator,
            value: value.clone(),
        });
    }
    Ok(update)
}

fn parse_relationship_updates<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    value: &Value,
    depth: u32,
) -> Result<Vec<RelationshipUpdate<'m>>, TranslateError> {
    ctx.check_depth(depth)?;
    let declared = ctx.model.entity(&relationship.target)?;
    let edge_entity = match &relationship.properties {
        Some(name) => Some(ctx.model.entity(name)?),
        None => None,
    };
    let mut updates = Vec::new();
    for (target, value) in keyed_by_member(ctx, declared, value, &relationship.name)? {
        for item in one_or_many(value) {
            let object = as_object(item, &relationship.name, target)?;
            let mut entry = RelationshipUpdate {
                relationship,
                target,
                filter: parse_where_on(ctx, relationship, target, object.get("where"), depth)?,
                update_node: None,
                update_edge: None,
                connect: Vec::new(),
                disconnect: Vec::new(),
                create: Vec::new(),
                delete: Vec::new(),
            };
            for (key, value) in object {
                match key.as_str() {
                    "where" => {}
                    "update" => {
                        let parts = as_object(value, key, target)?;
                        for (part, value) in parts {
                            match (part.as_str(), edge_entity) {
                                ("node", _) => {
                                    entry.update_node = Some(parse_node_update(
                                        ctx,
                                        target,
                                        as_object(value, part, target)?,
                                        depth + 1,
                                    )?);
                                }
                                ("edge", Some(edge)) => {
                                    let parsed = parse_node_update(
                                        ctx,
                                        edge,
                                        as_object(value, part, edge)?,
                                        depth + 1,
                                    )?;
                                    if !parsed.relationships.is_empty() {
                                        return Err(mismatch(
                                            "edges cannot have relationships".to_string(),
                                            edge,
                                        ));
                                    }
                                    entry.update_edge = Some(parsed);
                                }
                                _ => {
                                    return Err(mismatch(
                                        format!("unknown update key `{}`", part),
                                        target,
                                    ))
                                }
                            }
                        }
                    }
                    "connect" => {
                        for c in one_or_many(value) {
                            entry.connect.push(parse_connect(ctx, relationship, target, c, depth)?);
                        }
                    }
                    "disconnect" => {
                        for d in one_or_many(value) {
                            let d = as_object(d, key, target)?;
                            entry
                                .disconnect
                                .push(parse_where_on(ctx, relationship, target, d.get("where"), depth)?);
                        }
                    }
                    "create" => {
                        for c in one_or_many(value) {
                            entry
                                .create
                                .push(parse_nested_create(ctx, relationship, target, c, depth)?);
                        }
                    }
                    "delete" => {
                        for d in one_or_many(value) {
                            entry
                                .delete
                                .push(parse_nested_delete(ctx, relationship, target, d, depth)?);
                        }
                    }
                    other => {
                        return Err(mismatch(
                            format!("unknown relationship operation `{}`", other),
                            target,
                        ))
                    }
                }
            }
            updates.push(entry);
        }
    }
    Ok(updates)
}

/// `{ where: {..}, delete: { rel: [..] } }` for one relationship target.
fn parse_nested_delete<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    target: &'m Entity,
    value: &Value,
    depth: u32,
) -> Result<NestedDelete<'m>, TranslateError> {
    ctx.check_depth(depth)?;
    let object = as_object(value, "delete", target)?;
    let mut nested = Vec::new();
    for (key, value) in object {
        match key.as_str() {
            "where" => {}
            "delete" => nested = parse_delete_input(ctx, target, as_object(value, key, target)?, depth + 1)?,
            other => return Err(mismatch(format!("unknown delete key `{}`", other), target)),
        }
    }
    Ok(NestedDelete {
        relationship,
        target,
        filter: parse_where_on(ctx, relationship, target, object.get("where"), depth)?,
        nested,
    })
}

/// Nested deletes of a delete operation: `{ rel: [{ where, delete }] }`.
pub fn parse_delete_input<'m>(
    ctx: &TranslateContext<'m>,
    entity: &'m Entity,
    input: &Map<String, Value>,
    depth: u32,
) -> Result<Vec<NestedDelete<'m>>, TranslateError> {
    ctx.check_depth(depth)?;
    let mut deletes = Vec::new();
    for (key, value) in input {
        let rel = entity
            .relationship(key)
            .ok_or_else(|| mismatch(format!("unknown relationship `{}`", key), entity))?;
        let declared = ctx.model.entity(&rel.target)?;
        for (target, value) in keyed_by_member(ctx, declared, value, key)? {
            for item in one_or_many(value) {
                deletes.push(parse_nested_delete(ctx, rel, target, item, depth + 1)?);
            }
        }
    }
    Ok(deletes)
}
