//! Aggregate selections: `count` plus per-field `min/max/average/sum` and
//! `shortest/longest`, over related nodes and their edges or over every
//! node of an entity.

use serde_json::Value;

use super::authorization::match_phase;
use super::context::TranslateContext;
use super::errors::TranslateError;
use super::operation::{AggregateFunction, AggregateSelection, FieldSelection, WhereInput};
use super::predicate::{compile_filter, CompiledPredicate, FilterOptions};
use super::traversal::{filtered_match, label_guard, node_pattern, related_path};
use super::where_input::{parse_where, FilterExpr};
use crate::cypher_builder::{
    CallClause, CallImports, Clause, Expr, OrderByItem, Pagination, Pattern, ProjectionItem,
    ReturnClause, SortDirection, Statement, Variable, WithClause,
};
use crate::graph_catalog::{AuthorizationOperation, Entity, Field, RelationshipField};

const AGGREGATE: &[AuthorizationOperation] = &[AuthorizationOperation::Aggregate];

struct AggregateScope<'v, 'm> {
    parent: Option<&'v Variable>,
    relationship: Option<&'m RelationshipField>,
    target: &'m Entity,
    edge_entity: Option<&'m Entity>,
    filter: Option<FilterExpr<'m>>,
}

/// Read authorization for a node of a possibly polymorphic entity: each
/// implementation's rules guarded by its labels.
fn target_authorization<'m>(
    ctx: &mut TranslateContext<'m>,
    target: &'m Entity,
    node: &Variable,
) -> Result<CompiledPredicate, TranslateError> {
    if target.is_concrete() {
        return match_phase(ctx, AGGREGATE, target, node);
    }
    let model = ctx.model;
    let mut parts = Vec::new();
    let mut restricted = false;
    for member in model.concrete_entities(target) {
        let auth = match_phase(ctx, AGGREGATE, member, node)?;
        restricted |= !auth.is_empty();
        let mut branch = CompiledPredicate::from_expr(Some(Expr::has_labels(node, &member.labels)));
        branch.push(auth.predicate);
        branch.preludes.extend(auth.preludes);
        parts.push(branch);
    }
    if !restricted {
        return Ok(CompiledPredicate::default());
    }
    Ok(CompiledPredicate::or(parts))
}

/// MATCH over the aggregated nodes with filter, label guard and
/// authorization applied.
fn matched<'m>(
    ctx: &mut TranslateContext<'m>,
    scope: &AggregateScope<'_, 'm>,
    node: &Variable,
    edge: &Variable,
) -> Result<Vec<Clause>, TranslateError> {
    let pattern = match (scope.parent, scope.relationship) {
        (Some(parent), Some(rel)) => {
            related_path(parent, rel, Some(edge), node_pattern(node, scope.target))
        }
        _ => Pattern::node(node_pattern(node, scope.target)),
    };
    let mut predicate = match &scope.filter {
        Some(filter) => compile_filter(ctx, filter, node, FilterOptions::default())?,
        None => CompiledPredicate::default(),
    };
    predicate = CompiledPredicate::and(vec![
        CompiledPredicate::from_expr(label_guard(ctx.model, node, scope.target)),
        predicate,
        target_authorization(ctx, scope.target, node)?,
    ]);
    Ok(filtered_match(pattern, predicate, false))
}

fn check_function(
    field: &Field,
    function: AggregateFunction,
    owner: &Entity,
) -> Result<(), TranslateError> {
    let scalar = field.scalar();
    let valid = !field.is_list()
        && match function {
            AggregateFunction::Min | AggregateFunction::Max => {
                scalar.is_numeric() || scalar.is_temporal()
            }
            AggregateFunction::Average | AggregateFunction::Sum => scalar.is_numeric(),
            AggregateFunction::Shortest | AggregateFunction::Longest => scalar.is_textual(),
        };
    if valid {
        Ok(())
    } else {
        Err(TranslateError::schema_mismatch_with_context(
            format!(
                "`{}` cannot be aggregated with {} on type {}",
                field.name,
                function.key(),
                scalar
            ),
            &owner.name,
        ))
    }
}

struct FieldRequest<'m> {
    on_edge: bool,
    field: &'m Field,
    functions: Vec<AggregateFunction>,
}

fn field_requests<'m>(
    scope: &AggregateScope<'_, 'm>,
    selection: &AggregateSelection,
) -> Result<Vec<FieldRequest<'m>>, TranslateError> {
    let mut requests = Vec::new();
    for (on_edge, fields) in [(false, &selection.node), (true, &selection.edge)] {
        if fields.is_empty() {
            continue;
        }
        let owner = if on_edge {
            scope.edge_entity.ok_or_else(|| {
                TranslateError::schema_mismatch_with_context(
                    "edge aggregation needs relationship properties",
                    &scope.target.name,
                )
            })?
        } else {
            scope.target
        };
        for (name, functions) in fields {
            let field = owner.field(name).ok_or_else(|| {
                TranslateError::schema_mismatch_with_context(
                    format!("unknown field `{}`", name),
                    &owner.name,
                )
            })?;
            for function in functions {
                check_function(field, *function, owner)?;
            }
            requests.push(FieldRequest {
                on_edge,
                field,
                functions: functions.clone(),
            });
        }
    }
    Ok(requests)
}

/// The `CALL`s computing the selection, and the map assembling their results.
fn aggregate_calls<'m>(
    ctx: &mut TranslateContext<'m>,
    scope: &AggregateScope<'_, 'm>,
    selection: &AggregateSelection,
) -> Result<(Vec<Clause>, Expr), TranslateError> {
    let requests = field_requests(scope, selection)?;
    let imports = || match scope.parent {
        Some(parent) => CallImports::Variables(vec![parent.clone()]),
        None => CallImports::None,
    };

    let mut calls = Vec::new();
    let mut count = None;
    let mut node_entries = Vec::new();
    let mut edge_entries = Vec::new();

    // count and numeric/temporal aggregates share one match
    let numeric: Vec<&FieldRequest> = requests
        .iter()
        .filter(|r| !r.field.scalar().is_textual())
        .collect();
    if selection.count || !numeric.is_empty() {
        let node = ctx.variable("this");
        let edge = ctx.variable("this");
        let mut body = Statement::from_clauses(matched(ctx, scope, &node, &edge)?);
        let mut items = Vec::new();
        if selection.count {
            let var = ctx.variable("var");
            items.push(ProjectionItem::aliased(
                Expr::function("count", vec![node.expr()]),
                var.name(),
            ));
            count = Some(var);
        }
        for request in numeric {
            let owner = if request.on_edge { &edge } else { &node };
            let property = owner.property(request.field.db_name());
            let var = ctx.variable("var");
            let entries = request
                .functions
                .iter()
                .map(|function| {
                    let name = match function {
                        AggregateFunction::Average => "avg",
                        other => other.key(),
                    };
                    (
                        function.key().to_string(),
                        Expr::function(name, vec![property.clone()]),
                    )
                })
                .collect();
            items.push(ProjectionItem::aliased(Expr::Map(entries), var.name()));
            let target = if request.on_edge {
                &mut edge_entries
            } else {
                &mut node_entries
            };
            target.push((request.field.name.clone(), var.expr()));
        }
        body.push(Clause::Return(ReturnClause::new(items)));
        calls.push(Clause::Call(CallClause::new(imports(), body)));
    }

    // shortest/longest: one ordered collection per field
    for request in requests.iter().filter(|r| r.field.scalar().is_textual()) {
        let node = ctx.variable("this");
        let edge = ctx.variable("this");
        let owner = if request.on_edge { &edge } else { &node };
        let property = owner.property(request.field.db_name());
        let list = ctx.variable("var");
        let var = ctx.variable("var");
        let mut body = Statement::from_clauses(matched(ctx, scope, &node, &edge)?);
        body.push(Clause::With(WithClause {
            pagination: Pagination {
                order_by: vec![OrderByItem {
                    expr: Expr::function("size", vec![property.clone()]),
                    direction: SortDirection::Desc,
                }],
                ..Default::default()
            },
            ..WithClause::new(vec![ProjectionItem::variable(owner)])
        }));
        body.push(Clause::With(WithClause::new(vec![ProjectionItem::aliased(
            Expr::function("collect", vec![property]),
            list.name(),
        )])));
        let entries = request
            .functions
            .iter()
            .map(|function| {
                let pick = if *function == AggregateFunction::Longest {
                    "head"
                } else {
                    "last"
                };
                (
                    function.key().to_string(),
                    Expr::function(pick, vec![list.expr()]),
                )
            })
            .collect();
        body.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
            Expr::Map(entries),
            var.name(),
        )])));
        calls.push(Clause::Call(CallClause::new(imports(), body)));
        let target = if request.on_edge {
            &mut edge_entries
        } else {
            &mut node_entries
        };
        target.push((request.field.name.clone(), var.expr()));
    }

    let mut result = Vec::new();
    if let Some(count) = count {
        result.push(("count".to_string(), count.expr()));
    }
    if !node_entries.is_empty() {
        result.push(("node".to_string(), Expr::Map(node_entries)));
    }
    if !edge_entries.is_empty() {
        result.push(("edge".to_string(), Expr::Map(edge_entries)));
    }
    Ok((calls, Expr::Map(result)))
}

/// `<rel>Aggregate` field of a projected node.
pub fn nested_aggregate<'m>(
    ctx: &mut TranslateContext<'m>,
    parent: &Variable,
    relationship: &'m RelationshipField,
    fs: &FieldSelection,
    depth: u32,
) -> Result<(Vec<Clause>, Expr), TranslateError> {
    ctx.check_depth(depth)?;
    let model = ctx.model;
    let target = model.entity(&relationship.target)?;
    let edge_entity = match &relationship.properties {
        Some(name) => Some(model.entity(name)?),
        None => None,
    };
    let selection: AggregateSelection = serde_json::from_value(match &fs.selection {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    })
    .map_err(|e| TranslateError::SchemaMismatch(format!("invalid selection for `{}`: {}", fs.field, e)))?;
    let filter = match &fs.where_input {
        Some(input) => Some(parse_where(ctx, target, input, depth)?),
        None => None,
    };
    let scope = AggregateScope {
        parent: Some(parent),
        relationship: Some(relationship),
        target,
        edge_entity,
        filter,
    };
    aggregate_calls(ctx, &scope, &selection)
}

/// Top-level aggregate over every node of `entity`, returned as `this`.
pub fn root_aggregate<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    where_input: Option<&WhereInput>,
    selection: &AggregateSelection,
) -> Result<Vec<Clause>, TranslateError> {
    let filter = match where_input {
        Some(input) => Some(parse_where(ctx, entity, input, 1)?),
        None => None,
    };
    let scope = AggregateScope {
        parent: None,
        relationship: None,
        target: entity,
        edge_entity: None,
        filter,
    };
    let (mut clauses, value) = aggregate_calls(ctx, &scope, selection)?;
    clauses.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
        value,
        "this",
    )])));
    Ok(clauses)
}
