//! Relay-style connections: edges from one filtered match, `totalCount` from
//! the same collection, then sort and paging applied to that collection.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::authorization::match_phase;
use super::context::TranslateContext;
use super::errors::TranslateError;
use super::operation::{ConnectionSelection, WhereInput};
use super::predicate::{compile_connection_filter, compile_filter, CompiledPredicate, FilterOptions};
use super::projection::{object_shape, paging, project_node, ProjectionOptions};
use super::shape::{ConnectionShape, EdgesShape, ObjectShape};
use super::sort::{parse_sort, SortKey};
use super::traversal::{filtered_match, node_pattern, related_path};
use super::where_input::{parse_connection_where, parse_where, ConnectionFilter, FilterExpr};
use crate::cypher_builder::{
    CallClause, CallImports, Clause, Expr, OrderByItem, Pagination, Pattern, ProjectionItem,
    ReturnClause, Statement, Variable, WithClause,
};
use crate::graph_catalog::{AuthorizationOperation, Entity, RelationshipField};
use crate::utils::{cursor_to_offset, GlobalIdError};

const READ: &[AuthorizationOperation] = &[AuthorizationOperation::Read];

/// Arguments of a connection field or operation.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionRequest<'a> {
    pub where_input: Option<&'a WhereInput>,
    /// `[{ "node": { "title": "ASC" } }, { "edge": { "since": "DESC" } }]`
    pub sort: &'a [Map<String, Value>],
    pub first: Option<u64>,
    pub after: Option<&'a str>,
    pub selection: &'a ConnectionSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortSide {
    Node,
    Edge,
}

enum Source<'v, 'm> {
    Root(&'m Entity),
    Relationship {
        parent: &'v Variable,
        relationship: &'m RelationshipField,
    },
}

enum ParsedFilter<'m> {
    None,
    Node(FilterExpr<'m>),
    Connection(ConnectionFilter<'m>),
}

fn parse_connection_sort<'m>(
    target: &'m Entity,
    edge: Option<&'m Entity>,
    sort: &[Map<String, Value>],
) -> Result<Vec<(SortSide, SortKey<'m>)>, TranslateError> {
    let mut keys = Vec::new();
    for entry in sort {
        for (side, value) in entry {
            let inner = value.as_object().ok_or_else(|| {
                TranslateError::SchemaMismatch(format!("connection sort `{}` expects an object", side))
            })?;
            let (side, entity) = match (side.as_str(), edge) {
                ("node", _) => (SortSide::Node, target),
                ("edge", Some(edge)) => (SortSide::Edge, edge),
                _ => {
                    return Err(TranslateError::SchemaMismatch(format!(
                        "unknown connection sort key `{}`",
                        side
                    )))
                }
            };
            for key in parse_sort(entity, std::slice::from_ref(inner))? {
                keys.push((side, key));
            }
        }
    }
    Ok(keys)
}

fn keys_for<'m>(keys: &[(SortSide, SortKey<'m>)], side: SortSide) -> Vec<SortKey<'m>> {
    keys.iter()
        .filter(|(s, _)| *s == side)
        .map(|(_, k)| k.clone())
        .collect()
}

/// Clauses computing the connection and returning `{ edges, totalCount }`
/// as `result`.
fn connection_clauses<'m>(
    ctx: &mut TranslateContext<'m>,
    source: Source<'_, 'm>,
    request: &ConnectionRequest<'_>,
    depth: u32,
    result: &Variable,
) -> Result<(Vec<Clause>, ConnectionShape), TranslateError> {
    ctx.check_depth(depth)?;
    let model = ctx.model;
    let (target, relationship) = match &source {
        Source::Root(entity) => (*entity, None),
        Source::Relationship { relationship, .. } => {
            (model.entity(&relationship.target)?, Some(*relationship))
        }
    };
    let edge_entity = match relationship.and_then(|r| r.properties.as_deref()) {
        Some(name) => Some(model.entity(name)?),
        None => None,
    };

    let filter = match (request.where_input, relationship) {
        (None, _) => ParsedFilter::None,
        (Some(input), Some(rel)) => {
            ParsedFilter::Connection(parse_connection_where(ctx, rel, input, depth)?)
        }
        (Some(input), None) => ParsedFilter::Node(parse_where(ctx, target, input, depth)?),
    };
    let sort = parse_connection_sort(target, edge_entity, request.sort)?;
    let node_sort = keys_for(&sort, SortSide::Node);
    let edge_sort = keys_for(&sort, SortSide::Edge);

    let edge_selection = request.selection.edges.as_ref();
    let node_selection = edge_selection.and_then(|e| e.node.as_deref()).unwrap_or(&[]);
    let properties_selection = edge_selection.and_then(|e| e.properties.as_deref());
    let project_properties = properties_selection.is_some() || !edge_sort.is_empty();
    let edge_entity = match (project_properties, edge_entity) {
        (false, _) => None,
        (true, Some(entity)) => Some(entity),
        (true, None) => {
            return Err(TranslateError::SchemaMismatch(format!(
                "`{}` has no edge properties",
                relationship.map(|r| r.name.as_str()).unwrap_or(&target.name)
            )))
        }
    };

    let polymorphic = target.is_polymorphic();
    let edge = ctx.variable("edge");
    let mut branches = Vec::new();
    let mut node_shapes = BTreeMap::new();
    let mut properties_shape = ObjectShape::default();
    let mut node_sort_keys = Vec::new();
    let mut edge_sort_keys = Vec::new();

    for member in model.concrete_entities(target) {
        let node = ctx.variable("this");
        let (pattern, rel_var) = match &source {
            Source::Root(_) => (Pattern::node(node_pattern(&node, member)), None),
            Source::Relationship {
                parent,
                relationship,
            } => {
                let rel_var = ctx.variable("this");
                (
                    related_path(parent, relationship, Some(&rel_var), node_pattern(&node, member)),
                    Some(rel_var),
                )
            }
        };

        let compiled = match (&filter, &rel_var) {
            (ParsedFilter::None, _) => CompiledPredicate::default(),
            (ParsedFilter::Node(f), _) => compile_filter(ctx, f, &node, FilterOptions::default())?,
            (ParsedFilter::Connection(f), Some(rel_var)) => {
                compile_connection_filter(ctx, f, &node, rel_var, FilterOptions::default())?
            }
            (ParsedFilter::Connection(_), None) => CompiledPredicate::default(),
        };
        let auth = match_phase(ctx, READ, member, &node)?;
        let mut branch = Statement::from_clauses(filtered_match(
            pattern,
            CompiledPredicate::and(vec![compiled, auth]),
            false,
        ));

        let node_projection = project_node(
            ctx,
            member,
            &node,
            node_selection,
            depth,
            ProjectionOptions {
                resolve_type: true,
                sort: &node_sort,
            },
        )?;
        node_shapes.insert(member.name.clone(), node_projection.fields.clone());
        node_sort_keys = node_projection.sort_keys.clone();
        branch.clauses.extend(node_projection.subqueries);

        let mut entries = vec![("node".to_string(), node_projection.map)];
        let mut validations = node_projection.validations;
        if let (Some(edge_entity), Some(rel_var)) = (edge_entity, &rel_var) {
            let properties = project_node(
                ctx,
                edge_entity,
                rel_var,
                properties_selection.unwrap_or(&[]),
                depth,
                ProjectionOptions {
                    resolve_type: false,
                    sort: &edge_sort,
                },
            )?;
            properties_shape.fields = properties.fields;
            edge_sort_keys = properties.sort_keys;
            branch.clauses.extend(properties.subqueries);
            validations.extend(properties.validations);
            entries.push(("properties".to_string(), properties.map));
        }
        branch.clauses.extend(validations);
        branch.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
            Expr::Map(entries),
            edge.name(),
        )])));
        branches.push(branch);
    }

    let imports = match &source {
        Source::Root(_) => CallImports::None,
        Source::Relationship { parent, .. } => CallImports::Variables(vec![(*parent).clone()]),
    };
    let edges = ctx.variable("edges");
    let total = ctx.variable("totalCount");
    let mut clauses = vec![
        Clause::Call(CallClause::union(imports, branches)),
        Clause::With(WithClause::new(vec![ProjectionItem::aliased(
            Expr::function("collect", vec![edge.expr()]),
            edges.name(),
        )])),
        Clause::With(WithClause::new(vec![
            ProjectionItem::variable(&edges),
            ProjectionItem::aliased(Expr::function("size", vec![edges.expr()]), total.name()),
        ])),
    ];

    let offset = match request.after {
        Some(cursor) => cursor_to_offset(cursor)?
            .checked_add(1)
            .ok_or_else(|| GlobalIdError::InvalidCursor(cursor.to_string()))?,
        None => 0,
    };
    let (skip, limit) = paging(ctx, result.name(), Some(offset as u64), request.first)?;
    let mut node_keys = node_sort_keys.iter();
    let mut edge_keys = edge_sort_keys.iter();
    let mut order_by = Vec::with_capacity(sort.len());
    for (side, key) in &sort {
        let (container, map_key) = match side {
            SortSide::Node => ("node", node_keys.next()),
            SortSide::Edge => ("properties", edge_keys.next()),
        };
        if let Some(map_key) = map_key {
            order_by.push(OrderByItem {
                expr: edge.expr().property(container).property(map_key.clone()),
                direction: key.direction,
            });
        }
    }
    let pagination = Pagination {
        order_by,
        skip,
        limit,
    };

    let page = if pagination.is_empty() {
        edges.clone()
    } else {
        let paged = ctx.variable("var");
        let body = Statement::from_clauses(vec![
            Clause::Unwind {
                list: edges.expr(),
                alias: edge.clone(),
            },
            Clause::With(WithClause {
                pagination,
                ..WithClause::new(vec![ProjectionItem::variable(&edge)])
            }),
            Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
                Expr::function("collect", vec![edge.expr()]),
                paged.name(),
            )])),
        ]);
        clauses.push(Clause::Call(CallClause::new(
            CallImports::Variables(vec![edges.clone()]),
            body,
        )));
        paged
    };
    clauses.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
        Expr::Map(vec![
            ("edges".to_string(), page.expr()),
            ("totalCount".to_string(), total.expr()),
        ]),
        result.name(),
    )])));

    let shape = ConnectionShape {
        offset,
        total_count: request.selection.total_count,
        page_info: request.selection.page_info.clone(),
        edges: edge_selection.map(|e| EdgesShape {
            cursor: e.cursor,
            node: e.node.as_ref().map(|_| object_shape(polymorphic, node_shapes.clone())),
            properties: e.properties.as_ref().map(|_| properties_shape.clone()),
        }),
    };
    Ok((clauses, shape))
}

/// `<rel>Connection` field: one `CALL { WITH parent ... }` returning the
/// connection map.
pub fn nested_connection<'m>(
    ctx: &mut TranslateContext<'m>,
    parent: &Variable,
    relationship: &'m RelationshipField,
    request: &ConnectionRequest<'_>,
    depth: u32,
) -> Result<(Clause, Variable, ConnectionShape), TranslateError> {
    let result = ctx.variable("var");
    let (clauses, shape) = connection_clauses(
        ctx,
        Source::Relationship {
            parent,
            relationship,
        },
        request,
        depth,
        &result,
    )?;
    let call = CallClause::new(
        CallImports::Variables(vec![parent.clone()]),
        Statement::from_clauses(clauses),
    );
    Ok((Clause::Call(call), result, shape))
}

/// Top-level connection over every node of `entity`, returned as `this`.
pub fn root_connection<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    request: &ConnectionRequest<'_>,
) -> Result<(Vec<Clause>, ConnectionShape), TranslateError> {
    connection_clauses(ctx, Source::Root(entity), request, 1, &Variable::new("this"))
}
