//! Create operations.
//!
//! Every input row becomes its own `CALL { CREATE .. RETURN thisN }`; the
//! created nodes are then unwound into `this` and projected like a read.
//! Rows that all share one structure go through [`super::batch_create`]
//! instead when the configuration allows it.

use std::collections::BTreeMap;

use log::debug;

use super::batch_create::{batch_create, is_uniform};
use super::context::TranslateContext;
use super::errors::TranslateError;
use super::mutation_input::NodeInput;
use super::operation::Selection;
use super::projection::{object_shape, project_node, ProjectionOptions};
use super::read::RESULT_COLUMN;
use super::relationship_ops::{create_node, MutationBody};
use super::shape::{FieldShape, ResultShape};
use crate::cypher_builder::{
    CallClause, CallImports, Clause, Expr, ProjectionItem, ReturnClause, Statement, Variable,
};
use crate::graph_catalog::Entity;

/// Column holding the list of mutated nodes.
pub const MUTATION_COLUMN: &str = "data";

pub(crate) fn require_concrete(entity: &Entity, operation: &str) -> Result<(), TranslateError> {
    if entity.is_concrete() {
        Ok(())
    } else {
        Err(TranslateError::schema_mismatch_with_context(
            format!("{} needs a concrete entity", operation),
            &entity.name,
        ))
    }
}

/// `RETURN collect(var { .. }) AS data`, with the projection's subqueries.
pub(crate) fn mutation_result<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    var: &Variable,
    selection: &[Selection],
    distinct: bool,
) -> Result<(Vec<Clause>, ResultShape), TranslateError> {
    let projection = project_node(ctx, entity, var, selection, 1, ProjectionOptions::default())?;
    let mut clauses = projection.subqueries;
    clauses.extend(projection.validations);
    let collected = if distinct {
        Expr::distinct_function("collect", vec![projection.map])
    } else {
        Expr::function("collect", vec![projection.map])
    };
    clauses.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
        collected,
        MUTATION_COLUMN,
    )])));
    let shape = ResultShape {
        column: MUTATION_COLUMN.to_string(),
        root: FieldShape::Object(object_shape(
            false,
            BTreeMap::from([(entity.name.clone(), projection.fields)]),
        )),
    };
    Ok((clauses, shape))
}

pub fn create<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    inputs: &[NodeInput<'m>],
    selection: &[Selection],
) -> Result<(Statement, ResultShape), TranslateError> {
    require_concrete(entity, "create")?;
    if ctx.config.batch_create && is_uniform(ctx.model, inputs) {
        debug!("Batching create of {} `{}` rows", inputs.len(), entity.name);
        return batch_create(ctx, entity, inputs, selection);
    }
    debug!("Creating {} `{}` rows one by one", inputs.len(), entity.name);

    let mut statement = Statement::new();
    let mut created = Vec::with_capacity(inputs.len());
    for input in inputs {
        let var = ctx.variable("this");
        let mut body = MutationBody::default();
        create_node(ctx, input, &var, 1, &mut body)?;
        let mut clauses = body.into_clauses();
        clauses.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::variable(
            &var,
        )])));
        statement.push(Clause::Call(CallClause::new(
            CallImports::None,
            Statement::from_clauses(clauses),
        )));
        created.push(var.expr());
    }

    let this = Variable::new(RESULT_COLUMN);
    statement.push(Clause::Unwind {
        list: Expr::List(created),
        alias: this.clone(),
    });
    let (clauses, shape) = mutation_result(ctx, entity, &this, selection, false)?;
    statement.clauses.extend(clauses);
    Ok((statement, shape))
}
