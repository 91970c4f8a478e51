//! Batched create: uniform rows are bound as one list parameter and created
//! by a single `UNWIND $create_param AS row CALL { CREATE .. }`.
//!
//! Property values are read from the row (`row.title`), nested creates from
//! `row.<relationship>.create` through a nested `UNWIND`. A field set by only
//! some rows is still assigned from every row; rows without it read `null`,
//! which leaves the property unset.

use serde_json::{Map, Value};

use super::authorization::{after_validation, after_validation_unless};
use super::context::TranslateContext;
use super::create::mutation_result;
use super::errors::TranslateError;
use super::mutation_input::{NestedCreate, NodeInput};
use super::operation::Selection;
use super::relationship_ops::{cardinality_check, MutationBody, CREATE};
use super::set_properties::{generated_items, stored_value};
use super::shape::ResultShape;
use super::traversal::related_path;
use crate::cypher_builder::{
    CallClause, CallImports, Clause, Expr, NodePattern, Pattern, ProjectionItem, ReturnClause,
    SetItem, Statement, Variable,
};
use crate::graph_catalog::{Entity, Field, GraphModel, MutationKind, RelationshipField};

/// Rows can be batched when nothing in them needs per-row branching: no
/// `connect` anywhere and no nested create into an interface or union.
pub(crate) fn is_uniform(model: &GraphModel, inputs: &[NodeInput<'_>]) -> bool {
    inputs.iter().all(|input| uniform_node(model, input))
}

fn uniform_node(model: &GraphModel, input: &NodeInput<'_>) -> bool {
    input.relationships.iter().all(|rel| {
        let concrete_target = model
            .get(&rel.relationship.target)
            .map(Entity::is_concrete)
            .unwrap_or(false);
        rel.connect.is_empty()
            && (rel.create.is_empty() || concrete_target)
            && rel.create.iter().all(|nested| {
                uniform_node(model, &nested.node)
                    && nested.edge.as_ref().map_or(true, |e| uniform_node(model, e))
            })
    })
}

/// One row of the batch parameter: field values keyed by field name and
/// nested creates as `{ rel: { create: [{ node, edge }] } }`.
fn row_value(input: &NodeInput<'_>) -> Value {
    let mut row = Map::new();
    for property in input.properties.iter().chain(&input.populated) {
        row.insert(property.field.name.clone(), property.value.clone());
    }
    for relationship in &input.relationships {
        if relationship.create.is_empty() {
            continue;
        }
        let entry = row
            .entry(relationship.relationship.name.clone())
            .or_insert_with(|| serde_json::json!({ "create": [] }));
        if let Some(Value::Array(creates)) = entry.get_mut("create") {
            for nested in &relationship.create {
                let mut item = Map::new();
                item.insert("node".to_string(), row_value(&nested.node));
                if let Some(edge) = &nested.edge {
                    item.insert("edge".to_string(), row_value(edge));
                }
                creates.push(Value::Object(item));
            }
        }
    }
    Value::Object(row)
}

fn sets(input: &NodeInput<'_>, field: &Field) -> bool {
    input
        .properties
        .iter()
        .chain(&input.populated)
        .any(|p| p.field.name == field.name)
}

/// Fields some row sets, in declaration order.
fn set_fields<'m>(entity: &'m Entity, rows: &[&NodeInput<'m>]) -> Vec<&'m Field> {
    entity
        .fields
        .iter()
        .filter(|field| rows.iter().any(|row| sets(row, field)))
        .collect()
}

fn batch_items(
    ctx: &mut TranslateContext<'_>,
    entity: &Entity,
    fields: &[&Field],
    row: &Expr,
    var: &Variable,
) -> Vec<SetItem> {
    let mut items = generated_items(entity, var, MutationKind::Create);
    for field in fields {
        let raw = row.clone().property(&field.name);
        items.push(SetItem {
            target: var.property(field.db_name()),
            value: stored_value(ctx, field, raw),
        });
    }
    items
}

/// Row data for a batched node: the variable the row is bound to (imported
/// into nested subqueries) and the expression holding the node's values.
struct RowSource<'a> {
    var: &'a Variable,
    data: Expr,
}

fn batch_node<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    rows: &[&NodeInput<'m>],
    source: &RowSource<'_>,
    node: &Variable,
    depth: u32,
    body: &mut MutationBody,
) -> Result<(), TranslateError> {
    ctx.check_depth(depth)?;
    body.clauses
        .push(Clause::Create(vec![Pattern::node(NodePattern::labeled(node, &entity.labels))]));
    let fields = set_fields(entity, rows);
    let items = batch_items(ctx, entity, &fields, &source.data, node);
    if !items.is_empty() {
        body.clauses.push(Clause::Set(items));
    }

    for rel in &entity.relationships {
        let nested: Vec<&NestedCreate<'m>> = rows
            .iter()
            .flat_map(|row| row.relationships.iter())
            .filter(|input| input.relationship.name == rel.name)
            .flat_map(|input| input.create.iter())
            .collect();
        if nested.is_empty() {
            continue;
        }
        let call = batch_nested(ctx, node, source, rel, &nested, depth + 1)?;
        body.push_call(call);
    }

    for rel in entity.relationships.iter().filter(|r| r.is_singular()) {
        let check = cardinality_check(ctx, entity, rel, node)?;
        body.checks.push(check);
    }
    let entity_checks = after_validation(ctx, entity.authorization.as_ref(), CREATE, entity, node)?;
    body.checks.extend(entity_checks);
    for field in fields {
        if let Some(auth) = &field.authorization {
            let unset = Expr::is_null(source.data.clone().property(&field.name));
            let checks = after_validation_unless(ctx, Some(auth), CREATE, entity, node, unset)?;
            body.checks.extend(checks);
        }
    }
    Ok(())
}

/// `CALL { WITH parent, row UNWIND row.rel.create AS item CREATE .. MERGE ..
/// RETURN collect(NULL) AS varN }`
fn batch_nested<'m>(
    ctx: &mut TranslateContext<'m>,
    parent: &Variable,
    source: &RowSource<'_>,
    rel: &'m RelationshipField,
    nested: &[&NestedCreate<'m>],
    depth: u32,
) -> Result<Clause, TranslateError> {
    let target = ctx.model.entity(&rel.target)?;
    let item = ctx.variable("create_var");
    let node = ctx.variable("create_this");
    let mut body = MutationBody::default();
    body.clauses.push(Clause::Unwind {
        list: source.data.clone().property(&rel.name).property("create"),
        alias: item.clone(),
    });

    let nodes: Vec<&NodeInput<'m>> = nested.iter().map(|n| &n.node).collect();
    let node_source = RowSource {
        var: &item,
        data: item.property("node"),
    };
    batch_node(ctx, target, &nodes, &node_source, &node, depth, &mut body)?;

    let edge = ctx.variable("create_this");
    body.clauses.push(Clause::Merge(related_path(
        parent,
        rel,
        Some(&edge),
        NodePattern::new(&node),
    )));
    let edges: Vec<&NodeInput<'m>> = nested.iter().filter_map(|n| n.edge.as_ref()).collect();
    if let Some(first) = edges.first() {
        let edge_entity = first.entity;
        let fields = set_fields(edge_entity, &edges);
        let items = batch_items(ctx, edge_entity, &fields, &item.property("edge"), &edge);
        if !items.is_empty() {
            body.clauses.push(Clause::Set(items));
        }
    }

    let mut clauses = body.into_clauses();
    let done = ctx.variable("create_var");
    clauses.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
        Expr::function("collect", vec![Expr::null()]),
        done.name(),
    )])));
    Ok(Clause::Call(CallClause::new(
        CallImports::Variables(vec![parent.clone(), source.var.clone()]),
        Statement::from_clauses(clauses),
    )))
}

pub(crate) fn batch_create<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    inputs: &[NodeInput<'m>],
    selection: &[Selection],
) -> Result<(Statement, ResultShape), TranslateError> {
    let param_name = ctx.variable("create_param");
    let rows = Value::Array(inputs.iter().map(row_value).collect());
    let param = ctx.param(param_name.name(), rows)?;
    let row = ctx.variable("create_var");
    let node = ctx.variable("create_this");

    let refs: Vec<&NodeInput<'m>> = inputs.iter().collect();
    let source = RowSource {
        var: &row,
        data: row.expr(),
    };
    let mut body = MutationBody::default();
    batch_node(ctx, entity, &refs, &source, &node, 1, &mut body)?;
    let mut clauses = body.into_clauses();
    clauses.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::variable(
        &node,
    )])));

    let mut statement = Statement::from_clauses(vec![
        Clause::Unwind {
            list: param,
            alias: row.clone(),
        },
        Clause::Call(CallClause::new(
            CallImports::Variables(vec![row.clone()]),
            Statement::from_clauses(clauses),
        )),
    ]);
    let (result, shape) = mutation_result(ctx, entity, &node, selection, false)?;
    statement.clauses.extend(result);
    Ok((statement, shape))
}
