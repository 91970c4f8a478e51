//! Top-level read, connection and aggregate operations.

use log::debug;

use super::aggregation::root_aggregate;
use super::connection::{root_connection, ConnectionRequest};
use super::context::TranslateContext;
use super::errors::TranslateError;
use super::operation::{
    AggregateOperation, ConnectionOperation, ReadOperation, ReadOptions, Selection,
};
use super::projection::{member_filter, object_shape, paging, project_node, ProjectionOptions};
use super::shape::{FieldShape, ResultShape};
use super::sort::{order_by_node, order_by_projection, parse_sort};
use super::traversal::{filtered_match, node_pattern};
use super::where_input::{parse_where, FilterExpr};
use crate::cypher_builder::{
    CallClause, CallImports, Clause, Pagination, Pattern, ProjectionItem, ReturnClause, Statement,
    Variable, WithClause,
};
use crate::graph_catalog::{AuthorizationOperation, Entity};

const READ: &[AuthorizationOperation] = &[AuthorizationOperation::Read];

pub const RESULT_COLUMN: &str = "this";

/// Read of a concrete entity bound to `this`.
pub(crate) fn concrete_read<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    filter: Option<&FilterExpr<'m>>,
    options: &ReadOptions,
    selection: &[Selection],
) -> Result<(Statement, ResultShape), TranslateError> {
    let this = Variable::new(RESULT_COLUMN);
    let sort = parse_sort(entity, &options.sort)?;
    let predicate = member_filter(ctx, filter, entity, &this, READ)?;
    let mut statement = Statement::from_clauses(filtered_match(
        Pattern::node(node_pattern(&this, entity)),
        predicate,
        false,
    ));

    let (preludes, order_by) = order_by_node(ctx, &sort, entity, &this)?;
    statement.clauses.extend(preludes);
    let (skip, limit) = paging(ctx, this.name(), options.offset, options.limit)?;
    let pagination = Pagination {
        order_by,
        skip,
        limit,
    };
    if !pagination.is_empty() {
        statement.push(Clause::With(WithClause {
            pagination,
            ..WithClause::star()
        }));
    }

    let projection = project_node(ctx, entity, &this, selection, 1, ProjectionOptions::default())?;
    let fields = projection.fields.clone();
    statement.clauses.extend(projection.into_return(&this));
    Ok((
        statement,
        ResultShape {
            column: RESULT_COLUMN.to_string(),
            root: FieldShape::Object(object_shape(
                false,
                [(entity.name.clone(), fields)].into_iter().collect(),
            )),
        },
    ))
}

/// Interfaces and unions: one UNION branch per implementation, then sort
/// and paging over the projected maps.
fn polymorphic_read<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    filter: Option<&FilterExpr<'m>>,
    options: &ReadOptions,
    selection: &[Selection],
) -> Result<(Statement, ResultShape), TranslateError> {
    let this = Variable::new(RESULT_COLUMN);
    let sort = parse_sort(entity, &options.sort)?;
    let model = ctx.model;
    let mut branches = Vec::new();
    let mut shapes = std::collections::BTreeMap::new();
    let mut sort_keys = Vec::new();
    for member in model.concrete_entities(entity) {
        let node = ctx.variable("this");
        let predicate = member_filter(ctx, filter, member, &node, READ)?;
        let projection = project_node(
            ctx,
            member,
            &node,
            selection,
            1,
            ProjectionOptions {
                resolve_type: true,
                sort: &sort,
            },
        )?;
        shapes.insert(member.name.clone(), projection.fields.clone());
        sort_keys = projection.sort_keys.clone();
        let mut branch = Statement::from_clauses(filtered_match(
            Pattern::node(node_pattern(&node, member)),
            predicate,
            false,
        ));
        branch.clauses.extend(projection.into_return(&this));
        branches.push(branch);
    }

    let mut statement = Statement::from_clauses(vec![Clause::Call(CallClause::union(
        CallImports::None,
        branches,
    ))]);
    let (skip, limit) = paging(ctx, this.name(), options.offset, options.limit)?;
    statement.push(Clause::Return(ReturnClause {
        pagination: Pagination {
            order_by: order_by_projection(&sort, &this, &sort_keys),
            skip,
            limit,
        },
        ..ReturnClause::new(vec![ProjectionItem::variable(&this)])
    }));
    Ok((
        statement,
        ResultShape {
            column: RESULT_COLUMN.to_string(),
            root: FieldShape::Object(object_shape(true, shapes)),
        },
    ))
}

pub fn read<'m>(
    ctx: &mut TranslateContext<'m>,
    operation: &ReadOperation,
) -> Result<(Statement, ResultShape), TranslateError> {
    let entity = ctx.model.entity(&operation.entity)?;
    let filter = match &operation.where_input {
        Some(input) => Some(parse_where(ctx, entity, input, 1)?),
        None => None,
    };
    debug!(
        "Compiling read of `{}` ({})",
        entity.name,
        if entity.is_concrete() {
            "concrete"
        } else {
            "polymorphic"
        }
    );
    if entity.is_concrete() {
        concrete_read(
            ctx,
            entity,
            filter.as_ref(),
            &operation.options,
            &operation.selection,
        )
    } else {
        polymorphic_read(
            ctx,
            entity,
            filter.as_ref(),
            &operation.options,
            &operation.selection,
        )
    }
}

pub fn connection<'m>(
    ctx: &mut TranslateContext<'m>,
    operation: &ConnectionOperation,
) -> Result<(Statement, ResultShape), TranslateError> {
    let entity = ctx.model.entity(&operation.entity)?;
    let request = ConnectionRequest {
        where_input: operation.where_input.as_ref(),
        sort: &operation.sort,
        first: operation.first,
        after: operation.after.as_deref(),
        selection: &operation.selection,
    };
    let (clauses, shape) = root_connection(ctx, entity, &request)?;
    Ok((
        Statement::from_clauses(clauses),
        ResultShape {
            column: RESULT_COLUMN.to_string(),
            root: FieldShape::Connection(shape),
        },
    ))
}

pub fn aggregate<'m>(
    ctx: &mut TranslateContext<'m>,
    operation: &AggregateOperation,
) -> Result<(Statement, ResultShape), TranslateError> {
    let entity = ctx.model.entity(&operation.entity)?;
    let clauses = root_aggregate(
        ctx,
        entity,
        operation.where_input.as_ref(),
        &operation.selection,
    )?;
    Ok((
        Statement::from_clauses(clauses),
        ResultShape {
            column: RESULT_COLUMN.to_string(),
            root: FieldShape::Value,
        },
    ))
}
