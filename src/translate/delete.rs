//! Delete operations: nested deletes first, then `DETACH DELETE this`.

use log::debug;

use super::context::TranslateContext;
use super::create::require_concrete;
use super::errors::TranslateError;
use super::mutation_input::NestedDelete;
use super::projection::member_filter;
use super::read::RESULT_COLUMN;
use super::relationship_ops::{nested_delete_call, DELETE};
use super::traversal::{filtered_match, node_pattern};
use super::where_input::FilterExpr;
use crate::cypher_builder::{Clause, Pattern, Statement, Variable};
use crate::graph_catalog::Entity;

pub fn delete<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    filter: Option<&FilterExpr<'m>>,
    nested: &[NestedDelete<'m>],
) -> Result<Statement, TranslateError> {
    require_concrete(entity, "delete")?;
    debug!("Deleting `{}` with {} nested deletes", entity.name, nested.len());
    let this = Variable::new(RESULT_COLUMN);
    let predicate = member_filter(ctx, filter, entity, &this, DELETE)?;
    let mut statement = Statement::from_clauses(filtered_match(
        Pattern::node(node_pattern(&this, entity)),
        predicate,
        false,
    ));
    for item in nested {
        statement.push(nested_delete_call(ctx, &this, item, 2)?);
    }
    statement.push(Clause::Delete {
        detach: true,
        targets: vec![this.expr()],
    });
    Ok(statement)
}
