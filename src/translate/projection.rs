//! Projection of selected fields into map projections, with one `CALL`
//! subquery per relationship, connection and aggregate field.

use std::collections::{BTreeMap, HashSet};

use log::trace;
use serde_json::Value;

use super::aggregation::nested_aggregate;
use super::authorization::{before_validation, match_phase};
use super::connection::{nested_connection, ConnectionRequest};
use super::context::TranslateContext;
use super::errors::TranslateError;
use super::operation::{ConnectionSelection, FieldSelection, Selection};
use super::predicate::{compile_filter, CompiledPredicate, FilterOptions};
use super::shape::{FieldShape, ObjectShape, ShapeField, RESOLVE_TYPE_KEY};
use super::sort::{order_by_projection, parse_sort, SortKey};
use super::traversal::{filter_clauses, filtered_match, node_pattern, related_path};
use super::where_input::{parse_where, FilterExpr};
use crate::cypher_builder::{
    CallClause, CallImports, CaseExpr, Clause, Expr, ListComprehension, MapProjectionItem,
    Pagination, ProjectionItem, ReturnClause, Statement, Variable, WithClause,
};
use crate::graph_catalog::{AuthorizationOperation, Entity, Field, RelationshipField};

const READ: &[AuthorizationOperation] = &[AuthorizationOperation::Read];

/// Everything needed to return one node as a map.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeProjection {
    /// `CALL { }` subqueries feeding the map, in selection order
    pub subqueries: Vec<Clause>,
    /// Field-level read authorization, to run right before the projection
    pub validations: Vec<Clause>,
    pub map: Expr,
    pub fields: Vec<ShapeField>,
    /// Map keys carrying the requested sort values, one per sort key
    pub sort_keys: Vec<String>,
}

impl NodeProjection {
    /// Subqueries and validations, followed by `RETURN <map> AS alias`.
    pub fn into_return(self, alias: &Variable) -> Vec<Clause> {
        let mut clauses = self.subqueries;
        clauses.extend(self.validations);
        clauses.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
            self.map,
            alias.name(),
        )])));
        clauses
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionOptions<'a, 'm> {
    /// Add `__resolveType` so rows of a polymorphic result can be told apart
    pub resolve_type: bool,
    /// Sort keys whose values must be carried in the map
    pub sort: &'a [SortKey<'m>],
}

/// Selections that apply to `entity`, with inline fragments flattened.
/// Fragments on other implementations are skipped.
fn applicable_selections<'s>(
    ctx: &TranslateContext<'_>,
    entity: &Entity,
    selection: &'s [Selection],
    out: &mut Vec<&'s Selection>,
) -> Result<(), TranslateError> {
    for item in selection {
        match item {
            Selection::Fragment(fragment) => {
                let on = ctx.model.entity(&fragment.on)?;
                let applies = ctx
                    .model
                    .concrete_entities(on)
                    .iter()
                    .any(|member| member.name == entity.name);
                if applies {
                    applicable_selections(ctx, entity, &fragment.selection, out)?;
                }
            }
            other => out.push(other),
        }
    }
    Ok(())
}

fn point_map(expr: Expr) -> Expr {
    Expr::Map(vec![
        ("point".to_string(), expr.clone()),
        ("crs".to_string(), expr.property("crs")),
    ])
}

/// Stored value of a scalar field as returned to the caller.
fn scalar_value(ctx: &mut TranslateContext<'_>, field: &Field, var: &Variable) -> Expr {
    let property = var.property(field.db_name());
    if !field.scalar().is_point() {
        return property;
    }
    if field.is_list() {
        let p = ctx.variable("var");
        return Expr::ListComprehension(Box::new(ListComprehension {
            variable: p.clone(),
            list: property,
            filter: None,
            map: Some(point_map(p.expr())),
        }));
    }
    Expr::Case(Box::new(CaseExpr {
        branches: vec![(Expr::is_not_null(property.clone()), point_map(property))],
        default: Some(Expr::null()),
    }))
}

/// Parse the sub-selection of a relationship field.
pub fn sub_selection(fs: &FieldSelection) -> Result<Vec<Selection>, TranslateError> {
    if fs.selection.is_null() {
        return Err(TranslateError::SchemaMismatch(format!(
            "`{}` requires a selection",
            fs.field
        )));
    }
    serde_json::from_value(fs.selection.clone()).map_err(|e| {
        TranslateError::SchemaMismatch(format!("invalid selection for `{}`: {}", fs.field, e))
    })
}

struct MapBuilder {
    items: Vec<MapProjectionItem>,
    fields: Vec<ShapeField>,
    keys: HashSet<String>,
}

impl MapBuilder {
    fn new() -> Self {
        MapBuilder {
            items: Vec::new(),
            fields: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Returns false when the key is already taken; the first selection wins.
    fn claim(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    fn entry(&mut self, key: &str, value: Expr, shape: Option<FieldShape>) {
        let item = match &value {
            Expr::Property(target, property)
                if property == key && matches!(**target, Expr::Variable(_)) =>
            {
                MapProjectionItem::Property(key.to_string())
            }
            _ => MapProjectionItem::Entry(key.to_string(), value),
        };
        self.items.push(item);
        if let Some(shape) = shape {
            self.fields.push(ShapeField {
                key: key.to_string(),
                shape,
            });
        }
    }
}

/// Project a concrete node bound to `var`.
pub fn project_node<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    var: &Variable,
    selection: &[Selection],
    depth: u32,
    options: ProjectionOptions<'_, 'm>,
) -> Result<NodeProjection, TranslateError> {
    ctx.check_depth(depth)?;
    let mut flat = Vec::with_capacity(selection.len());
    applicable_selections(ctx, entity, selection, &mut flat)?;

    let mut map = MapBuilder::new();
    let mut subqueries = Vec::new();
    let mut field_auth = Vec::new();

    for item in flat {
        let (name, key, fs) = match item {
            Selection::Scalar(name) => (name.as_str(), name.as_str(), None),
            Selection::Field(fs) => (fs.field.as_str(), fs.output_key(), Some(fs)),
            Selection::Fragment(_) => continue,
        };
        if !map.claim(key) {
            continue;
        }

        if name == "__typename" {
            map.entry(key, Expr::string(&entity.name), Some(FieldShape::Value));
            continue;
        }
        if name == "id" {
            if let Some(relay) = entity.relay_id_field() {
                map.entry(
                    key,
                    var.property(relay.db_name()),
                    Some(FieldShape::GlobalId {
                        type_name: Some(entity.name.clone()),
                        field: relay.name.clone(),
                    }),
                );
                continue;
            }
        }
        if let Some(field) = entity.field(name) {
            if let Some(auth) = &field.authorization {
                field_auth.push(before_validation(ctx, Some(auth), READ, entity, var)?);
            }
            let value = scalar_value(ctx, field, var);
            map.entry(key, value, Some(FieldShape::Value));
            continue;
        }

        let Some(fs) = fs else {
            return Err(TranslateError::schema_mismatch_with_context(
                format!("`{}` is not a scalar field and needs a selection", name),
                &entity.name,
            ));
        };

        if let Some(rel) = entity.relationship(name) {
            let (clause, result, shape) = relationship_field(ctx, var, rel, fs, depth + 1)?;
            subqueries.push(clause);
            map.entry(key, result.expr(), Some(FieldShape::Object(shape)));
            continue;
        }
        if let Some(rel) = name.strip_suffix("Connection").and_then(|n| entity.relationship(n)) {
            let connection: ConnectionSelection = serde_json::from_value(fs.selection.clone())
                .map_err(|e| {
                    TranslateError::SchemaMismatch(format!(
                        "invalid selection for `{}`: {}",
                        fs.field, e
                    ))
                })?;
            let request = ConnectionRequest {
                where_input: fs.where_input.as_ref(),
                sort: &fs.sort,
                first: fs.first,
                after: fs.after.as_deref(),
                selection: &connection,
            };
            let (clause, result, shape) = nested_connection(ctx, var, rel, &request, depth + 1)?;
            subqueries.push(clause);
            map.entry(key, result.expr(), Some(FieldShape::Connection(shape)));
            continue;
        }
        if let Some(rel) = name.strip_suffix("Aggregate").and_then(|n| entity.relationship(n)) {
            let (clauses, value) = nested_aggregate(ctx, var, rel, fs, depth + 1)?;
            subqueries.extend(clauses);
            map.entry(key, value, Some(FieldShape::Value));
            continue;
        }
        return Err(TranslateError::schema_mismatch_with_context(
            format!("unknown field `{}`", name),
            &entity.name,
        ));
    }

    if options.resolve_type {
        map.entry(RESOLVE_TYPE_KEY, Expr::string(&entity.name), None);
    }

    let mut sort_keys = Vec::with_capacity(options.sort.len());
    for key in options.sort {
        let helper = key.helper_key();
        if map.claim(&helper) {
            let value = key.value(ctx, entity, var)?;
            map.entry(&helper, value, None);
        }
        sort_keys.push(helper);
    }

    trace!(
        "Projected {} fields of `{}` as {}",
        map.fields.len(),
        entity.name,
        var.name()
    );

    Ok(NodeProjection {
        subqueries,
        validations: filter_clauses(CompiledPredicate::and(field_auth)),
        map: Expr::MapProjection {
            variable: var.clone(),
            items: map.items,
        },
        fields: map.fields,
        sort_keys,
    })
}

/// Filter for a node of `member` matched through a (possibly polymorphic)
/// where input, plus the member's read authorization.
pub fn member_filter<'m>(
    ctx: &mut TranslateContext<'m>,
    filter: Option<&FilterExpr<'m>>,
    member: &'m Entity,
    node: &Variable,
    operations: &[AuthorizationOperation],
) -> Result<CompiledPredicate, TranslateError> {
    let filter = match filter {
        Some(f) => compile_filter(ctx, f, node, FilterOptions::default())?,
        None => CompiledPredicate::default(),
    };
    let auth = match_phase(ctx, operations, member, node)?;
    Ok(CompiledPredicate::and(vec![filter, auth]))
}

/// Paging parameters for a `WITH`/`RETURN`.
pub fn paging(
    ctx: &mut TranslateContext<'_>,
    base: &str,
    offset: Option<u64>,
    limit: Option<u64>,
) -> Result<(Option<Expr>, Option<Expr>), TranslateError> {
    let skip = match offset.filter(|o| *o > 0) {
        Some(o) => Some(ctx.param(&format!("{}_offset", base), Value::from(o))?),
        None => None,
    };
    let limit = match limit {
        Some(l) => Some(ctx.param(&format!("{}_limit", base), Value::from(l))?),
        None => None,
    };
    Ok((skip, limit))
}

/// `CALL { WITH parent CALL { <branch per implementation> } WITH v ORDER BY ..
/// RETURN collect(v) AS v }`; singular relationships return `head(collect(v))`.
fn relationship_field<'m>(
    ctx: &mut TranslateContext<'m>,
    parent: &Variable,
    rel: &'m RelationshipField,
    fs: &FieldSelection,
    depth: u32,
) -> Result<(Clause, Variable, ObjectShape), TranslateError> {
    ctx.check_depth(depth)?;
    let target = ctx.model.entity(&rel.target)?;
    let selection = sub_selection(fs)?;
    let sort = parse_sort(target, &fs.options.sort)?;
    let filter = match &fs.where_input {
        Some(input) => Some(parse_where(ctx, target, input, depth)?),
        None => None,
    };
    let polymorphic = target.is_polymorphic();
    let result = ctx.variable("var");

    let mut branches = Vec::new();
    let mut shape = ObjectShape::default();
    let mut sort_keys = Vec::new();
    let model = ctx.model;
    for member in model.concrete_entities(target) {
        let node = ctx.variable("this");
        let pattern = related_path(parent, rel, None, node_pattern(&node, member));
        let predicate = member_filter(ctx, filter.as_ref(), member, &node, READ)?;
        let projection = project_node(
            ctx,
            member,
            &node,
            &selection,
            depth,
            ProjectionOptions {
                resolve_type: polymorphic,
                sort: &sort,
            },
        )?;
        if polymorphic {
            shape.branches.insert(member.name.clone(), projection.fields.clone());
        } else {
            shape.fields = projection.fields.clone();
        }
        sort_keys = projection.sort_keys.clone();

        let mut branch = Statement::from_clauses(filtered_match(pattern, predicate, false));
        branch.clauses.extend(projection.into_return(&result));
        branches.push(branch);
    }

    let mut body = Statement::from_clauses(vec![Clause::Call(CallClause::union(
        CallImports::Variables(vec![parent.clone()]),
        branches,
    ))]);
    let (skip, limit) = paging(ctx, result.name(), fs.options.offset, fs.options.limit)?;
    let pagination = Pagination {
        order_by: order_by_projection(&sort, &result, &sort_keys),
        skip,
        limit,
    };
    if !pagination.is_empty() {
        body.push(Clause::With(WithClause {
            pagination,
            ..WithClause::new(vec![ProjectionItem::variable(&result)])
        }));
    }
    let collected = Expr::function("collect", vec![result.expr()]);
    let value = if rel.is_singular() {
        Expr::function("head", vec![collected])
    } else {
        collected
    };
    body.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
        value,
        result.name(),
    )])));

    Ok((
        Clause::Call(CallClause::new(CallImports::Variables(vec![parent.clone()]), body)),
        result,
        shape,
    ))
}

/// Object shape for the selection of every implementation of `entity`.
pub fn object_shape(
    polymorphic: bool,
    branches: BTreeMap<String, Vec<ShapeField>>,
) -> ObjectShape {
    if polymorphic {
        ObjectShape {
            fields: vec![],
            branches,
        }
    } else {
        ObjectShape {
            fields: branches.into_values().next().unwrap_or_default(),
            branches: BTreeMap::new(),
        }
    }
}
