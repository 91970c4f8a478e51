//! Parsing of `where` inputs into typed filter trees.
//!
//! Key grammar, per entity:
//! - `AND: [..]`, `OR: [..]`, `NOT: {..}`
//! - `<field>` plus an operator suffix (`_NOT`, `_IN`, `_LT`, `_CONTAINS`, ...)
//! - `<rel>`, `<rel>_SOME`, `<rel>_ALL`, `<rel>_NONE`, `<rel>_NOT`, `<rel>_SINGLE`
//! - `<rel>Connection` with the same suffixes, taking `{ node, edge }`
//! - `<rel>Aggregate`
//! - on unions, member type names
//! - `id` on entities with a relay id field, taking a global id

use serde_json::{Map, Value};

use super::aggregate_where::{parse_aggregate_where, AggregateFilter};
use super::context::TranslateContext;
use super::errors::TranslateError;
use crate::graph_catalog::{Entity, EntityKind, Field, FieldType, RelationshipField};
use crate::utils::GlobalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperator {
    Equal,
    Not,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Matches,
    Includes,
    NotIncludes,
    Distance,
}

/// Longest suffixes first so `_NOT_IN` wins over `_IN`.
const FIELD_SUFFIXES: &[(&str, FieldOperator)] = &[
    ("_NOT_STARTS_WITH", FieldOperator::NotStartsWith),
    ("_NOT_ENDS_WITH", FieldOperator::NotEndsWith),
    ("_NOT_CONTAINS", FieldOperator::NotContains),
    ("_NOT_INCLUDES", FieldOperator::NotIncludes),
    ("_STARTS_WITH", FieldOperator::StartsWith),
    ("_ENDS_WITH", FieldOperator::EndsWith),
    ("_CONTAINS", FieldOperator::Contains),
    ("_INCLUDES", FieldOperator::Includes),
    ("_DISTANCE", FieldOperator::Distance),
    ("_MATCHES", FieldOperator::Matches),
    ("_NOT_IN", FieldOperator::NotIn),
    ("_NOT", FieldOperator::Not),
    ("_LTE", FieldOperator::Lte),
    ("_GTE", FieldOperator::Gte),
    ("_LT", FieldOperator::Lt),
    ("_GT", FieldOperator::Gt),
    ("_IN", FieldOperator::In),
];

impl FieldOperator {
    pub fn suffix(&self) -> &'static str {
        FIELD_SUFFIXES
            .iter()
            .find(|(_, op)| op == self)
            .map(|(suffix, _)| *suffix)
            .unwrap_or("")
    }

    /// Split `title_STARTS_WITH` into (`title`, StartsWith).
    pub fn split_key(key: &str) -> Vec<(&str, FieldOperator)> {
        let mut candidates = vec![(key, FieldOperator::Equal)];
        for (suffix, op) in FIELD_SUFFIXES {
            if let Some(name) = key.strip_suffix(suffix) {
                if !name.is_empty() {
                    candidates.push((name, *op));
                }
            }
        }
        candidates
    }

    pub fn supports(&self, field_type: &FieldType) -> bool {
        let scalar = field_type.scalar;
        match self {
            FieldOperator::Equal | FieldOperator::Not => true,
            FieldOperator::In | FieldOperator::NotIn => !field_type.list,
            FieldOperator::Lt | FieldOperator::Lte | FieldOperator::Gt | FieldOperator::Gte => {
                !field_type.list && (scalar.is_ordered() || scalar.is_point())
            }
            FieldOperator::Contains
            | FieldOperator::NotContains
            | FieldOperator::StartsWith
            | FieldOperator::NotStartsWith
            | FieldOperator::EndsWith
            | FieldOperator::NotEndsWith
            | FieldOperator::Matches => !field_type.list && scalar.is_textual(),
            FieldOperator::Includes | FieldOperator::NotIncludes => field_type.list,
            FieldOperator::Distance => !field_type.list && scalar.is_point(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipQuantifier {
    Some,
    All,
    None,
    Single,
}

impl RelationshipQuantifier {
    fn split_key(key: &str) -> (&str, RelationshipQuantifier) {
        for (suffix, q) in [
            ("_SOME", RelationshipQuantifier::Some),
            ("_ALL", RelationshipQuantifier::All),
            ("_NONE", RelationshipQuantifier::None),
            ("_NOT", RelationshipQuantifier::None),
            ("_SINGLE", RelationshipQuantifier::Single),
        ] {
            if let Some(name) = key.strip_suffix(suffix) {
                return (name, q);
            }
        }
        (key, RelationshipQuantifier::Some)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr<'m> {
    And(Vec<FilterExpr<'m>>),
    Or(Vec<FilterExpr<'m>>),
    Not(Box<FilterExpr<'m>>),
    Field {
        field: &'m Field,
        operator: FieldOperator,
        value: Value,
    },
    /// `filter` is `None` for a `null` input ("no related node")
    Relationship {
        relationship: &'m RelationshipField,
        target: &'m Entity,
        quantifier: RelationshipQuantifier,
        filter: Option<Box<FilterExpr<'m>>>,
    },
    Connection {
        relationship: &'m RelationshipField,
        target: &'m Entity,
        quantifier: RelationshipQuantifier,
        filter: Option<Box<ConnectionFilter<'m>>>,
    },
    Aggregate {
        relationship: &'m RelationshipField,
        target: &'m Entity,
        filter: AggregateFilter<'m>,
    },
    /// Union member filter: `(n:Member AND ...)`
    OnType {
        entity: &'m Entity,
        filter: Box<FilterExpr<'m>>,
    },
}

impl FilterExpr<'_> {
    pub fn is_empty(&self) -> bool {
        matches!(self, FilterExpr::And(items) if items.is_empty())
    }
}

/// Filter over a relationship: node part, edge part and combinators.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionFilter<'m> {
    And(Vec<ConnectionFilter<'m>>),
    Or(Vec<ConnectionFilter<'m>>),
    Not(Box<ConnectionFilter<'m>>),
    Node(FilterExpr<'m>),
    Edge(FilterExpr<'m>),
}

fn expect_object<'v>(
    value: &'v Value,
    key: &str,
    entity: &Entity,
) -> Result<&'v Map<String, Value>, TranslateError> {
    value.as_object().ok_or_else(|| {
        TranslateError::schema_mismatch_with_context(
            format!("`{}` expects an object", key),
            &entity.name,
        )
    })
}

fn expect_array<'v>(
    value: &'v Value,
    key: &str,
    entity: &Entity,
) -> Result<&'v Vec<Value>, TranslateError> {
    value.as_array().ok_or_else(|| {
        TranslateError::schema_mismatch_with_context(
            format!("`{}` expects a list", key),
            &entity.name,
        )
    })
}

/// Parse a `where` input against `entity`.
pub fn parse_where<'m>(
    ctx: &TranslateContext<'m>,
    entity: &'m Entity,
    input: &Map<String, Value>,
    depth: u32,
) -> Result<FilterExpr<'m>, TranslateError> {
    ctx.check_depth(depth)?;
    let mut items = Vec::with_capacity(input.len());
    for (key, value) in input {
        items.push(parse_key(ctx, entity, key, value, depth)?);
    }
    if items.len() == 1 {
        return Ok(items.remove(0));
    }
    Ok(FilterExpr::And(items))
}

fn parse_list<'m>(
    ctx: &TranslateContext<'m>,
    entity: &'m Entity,
    key: &str,
    value: &Value,
    depth: u32,
) -> Result<Vec<FilterExpr<'m>>, TranslateError> {
    expect_array(value, key, entity)?
        .iter()
        .map(|item| parse_where(ctx, entity, expect_object(item, key, entity)?, depth + 1))
        .collect()
}

fn parse_key<'m>(
    ctx: &TranslateContext<'m>,
    entity: &'m Entity,
    key: &str,
    value: &Value,
    depth: u32,
) -> Result<FilterExpr<'m>, TranslateError> {
    match key {
        "AND" => return Ok(FilterExpr::And(parse_list(ctx, entity, key, value, depth)?)),
        "OR" => return Ok(FilterExpr::Or(parse_list(ctx, entity, key, value, depth)?)),
        "NOT" => {
            let inner = parse_where(ctx, entity, expect_object(value, key, entity)?, depth + 1)?;
            return Ok(FilterExpr::Not(Box::new(inner)));
        }
        _ => {}
    }

    if entity.kind == EntityKind::Union {
        if !entity.implementations.iter().any(|m| m == key) {
            return Err(TranslateError::schema_mismatch_with_context(
                format!("`{}` is not a member type", key),
                &entity.name,
            ));
        }
        let member = ctx.model.entity(key)?;
        let filter = parse_where(ctx, member, expect_object(value, key, entity)?, depth + 1)?;
        return Ok(FilterExpr::OnType {
            entity: member,
            filter: Box::new(filter),
        });
    }

    // `id` is the global id whenever the entity has a relay id field
    if key == "id" {
        if let Some(relay) = entity.relay_id_field() {
            return parse_global_id(ctx, entity, relay, value);
        }
    }

    if let Some(expr) = parse_relationship_key(ctx, entity, key, value, depth)? {
        return Ok(expr);
    }

    for (name, operator) in FieldOperator::split_key(key) {
        if let Some(field) = entity.field(name) {
            if !operator.supports(&field.field_type) {
                return Err(TranslateError::schema_mismatch_with_context(
                    format!(
                        "operator `{}` is not valid for field `{}` of type {}",
                        key,
                        field.name,
                        field.scalar()
                    ),
                    &entity.name,
                ));
            }
            if matches!(operator, FieldOperator::In | FieldOperator::NotIn) && !value.is_array() {
                return Err(TranslateError::schema_mismatch_with_context(
                    format!("`{}` expects a list", key),
                    &entity.name,
                ));
            }
            return Ok(FilterExpr::Field {
                field,
                operator,
                value: value.clone(),
            });
        }
    }

    Err(TranslateError::schema_mismatch_with_context(
        format!("unknown filter key `{}`", key),
        &entity.name,
    ))
}

fn parse_global_id<'m>(
    ctx: &TranslateContext<'m>,
    entity: &'m Entity,
    relay: &'m Field,
    value: &Value,
) -> Result<FilterExpr<'m>, TranslateError> {
    let token = value.as_str().ok_or_else(|| {
        TranslateError::schema_mismatch_with_context("`id` expects a global id string", &entity.name)
    })?;
    let resolved = GlobalId::decode(token)?.resolve(ctx.model)?;
    if resolved.entity.name != entity.name {
        return Err(crate::utils::GlobalIdError::FieldMismatch {
            type_name: resolved.entity.name.clone(),
            field: relay.name.clone(),
        }
        .into());
    }
    Ok(FilterExpr::Field {
        field: relay,
        operator: FieldOperator::Equal,
        value: resolved.value,
    })
}

fn parse_relationship_key<'m>(
    ctx: &TranslateContext<'m>,
    entity: &'m Entity,
    key: &str,
    value: &Value,
    depth: u32,
) -> Result<Option<FilterExpr<'m>>, TranslateError> {
    if let Some(name) = key.strip_suffix("Aggregate") {
        if let Some(relationship) = entity.relationship(name) {
            let target = ctx.model.entity(&relationship.target)?;
            let filter = parse_aggregate_where(
                ctx,
                relationship,
                target,
                expect_object(value, key, entity)?,
                depth + 1,
            )?;
            return Ok(Some(FilterExpr::Aggregate {
                relationship,
                target,
                filter,
            }));
        }
    }

    let (base, quantifier) = RelationshipQuantifier::split_key(key);

    if let Some(name) = base.strip_suffix("Connection") {
        if let Some(relationship) = entity.relationship(name) {
            let target = ctx.model.entity(&relationship.target)?;
            let filter = match value {
                Value::Null => None,
                other => Some(Box::new(parse_connection_where(
                    ctx,
                    relationship,
                    expect_object(other, key, entity)?,
                    depth + 1,
                )?)),
            };
            return Ok(Some(FilterExpr::Connection {
                relationship,
                target,
                quantifier,
                filter,
            }));
        }
    }

    if let Some(relationship) = entity.relationship(base) {
        let target = ctx.model.entity(&relationship.target)?;
        let filter = match value {
            Value::Null => None,
            other => Some(Box::new(parse_where(
                ctx,
                target,
                expect_object(other, key, entity)?,
                depth + 1,
            )?)),
        };
        return Ok(Some(FilterExpr::Relationship {
            relationship,
            target,
            quantifier,
            filter,
        }));
    }
    Ok(None)
}

/// Parse `{ node: {..}, edge: {..}, AND, OR, NOT }` for a relationship.
pub fn parse_connection_where<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    input: &Map<String, Value>,
    depth: u32,
) -> Result<ConnectionFilter<'m>, TranslateError> {
    let source = ctx.model.entity(&relationship.target)?;
    parse_connection_where_on(ctx, relationship, source, input, depth)
}

/// As [`parse_connection_where`], with the node part read against `source`
/// (one member of a union target).
pub fn parse_connection_where_on<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    source: &'m Entity,
    input: &Map<String, Value>,
    depth: u32,
) -> Result<ConnectionFilter<'m>, TranslateError> {
    ctx.check_depth(depth)?;
    let mut items = Vec::with_capacity(input.len());
    for (key, value) in input {
        let item = match key.as_str() {
            "node" => ConnectionFilter::Node(parse_where(
                ctx,
                source,
                expect_object(value, key, source)?,
                depth + 1,
            )?),
            "edge" => {
                let props = relationship.properties.as_deref().ok_or_else(|| {
                    TranslateError::SchemaMismatch(format!(
                        "relationship `{}` has no edge properties",
                        relationship.name
                    ))
                })?;
                let edge_entity = ctx.model.entity(props)?;
                ConnectionFilter::Edge(parse_where(
                    ctx,
                    edge_entity,
                    expect_object(value, key, edge_entity)?,
                    depth + 1,
                )?)
            }
            "AND" | "OR" => {
                let parts = expect_array(value, key, source)?
                    .iter()
                    .map(|v| {
                        parse_connection_where_on(
                            ctx,
                            relationship,
                            source,
                            expect_object(v, key, source)?,
                            depth + 1,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if key == "AND" {
                    ConnectionFilter::And(parts)
                } else {
                    ConnectionFilter::Or(parts)
                }
            }
            "NOT" => ConnectionFilter::Not(Box::new(parse_connection_where_on(
                ctx,
                relationship,
                source,
                expect_object(value, key, source)?,
                depth + 1,
            )?)),
            other => {
                return Err(TranslateError::SchemaMismatch(format!(
                    "unknown connection filter key `{}` on `{}`",
                    other, relationship.name
                )))
            }
        };
        items.push(item);
    }
    if items.len() == 1 {
        return Ok(items.remove(0));
    }
    Ok(ConnectionFilter::And(items))
}
