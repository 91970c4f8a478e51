//! Update operations: match, check, `SET`, then one subquery per nested
//! relationship operation.

use std::collections::HashSet;

use log::debug;

use super::authorization::{after_validation, before_validation};
use super::context::TranslateContext;
use super::create::{mutation_result, require_concrete};
use super::errors::TranslateError;
use super::mutation_input::{NodeUpdate, RelationshipUpdate};
use super::operation::Selection;
use super::predicate::CompiledPredicate;
use super::projection::member_filter;
use super::read::RESULT_COLUMN;
use super::relationship_ops::{
    barrier, cardinality_check, connect_call, count_return, disconnect_call, nested_create,
    nested_delete_call, related_predicate, MutationBody, UPDATE,
};
use super::set_properties::update_items;
use super::shape::ResultShape;
use super::traversal::{filter_clauses, filtered_match, node_pattern, related_path};
use super::where_input::FilterExpr;
use crate::cypher_builder::{CallClause, CallImports, Clause, Pattern, Statement, Variable};
use crate::graph_catalog::Entity;

fn call_on(parent: &Variable, clauses: Vec<Clause>) -> Clause {
    Clause::Call(CallClause::new(
        CallImports::Variables(vec![parent.clone()]),
        Statement::from_clauses(clauses),
    ))
}

/// Nested operations of one relationship entry, in the order update,
/// disconnect, connect, create, delete.
fn relationship_update<'m>(
    ctx: &mut TranslateContext<'m>,
    parent_entity: &'m Entity,
    parent: &Variable,
    entry: &RelationshipUpdate<'m>,
    depth: u32,
    body: &mut MutationBody,
) -> Result<(), TranslateError> {
    ctx.check_depth(depth)?;
    let rel = entry.relationship;

    if entry.update_node.is_some() || entry.update_edge.is_some() {
        let node = ctx.variable("this");
        let edge = ctx.variable("this");
        let predicate =
            related_predicate(ctx, entry.target, entry.filter.as_ref(), &node, &edge, UPDATE)?;
        let mut clauses = filtered_match(
            related_path(parent, rel, Some(&edge), node_pattern(&node, entry.target)),
            predicate,
            false,
        );
        if let Some(node_update) = &entry.update_node {
            clauses.extend(update_node(ctx, node_update, &node, depth + 1)?);
        }
        if let Some(edge_update) = &entry.update_edge {
            let items = update_items(ctx, edge_update, &edge)?;
            if !items.is_empty() {
                clauses.push(Clause::Set(items));
            }
        }
        clauses.push(count_return(ctx));
        body.push_call(call_on(parent, clauses));
    }

    for filter in &entry.disconnect {
        let call = disconnect_call(
            ctx,
            parent,
            parent_entity,
            rel,
            entry.target,
            filter.as_ref(),
            depth,
        )?;
        body.push_call(call);
    }
    for connect in &entry.connect {
        let call = connect_call(ctx, parent, parent_entity, rel, connect, depth)?;
        body.push_call(call);
    }
    for create in &entry.create {
        let mut nested = MutationBody::default();
        nested_create(ctx, parent, rel, create, depth, &mut nested)?;
        let mut clauses = nested.into_clauses();
        clauses.push(count_return(ctx));
        body.push_call(call_on(parent, clauses));
    }
    for delete in &entry.delete {
        let call = nested_delete_call(ctx, parent, delete, depth)?;
        body.push_call(call);
    }
    Ok(())
}

/// Checks, `SET` and nested operations for a node already bound to `var`.
pub(crate) fn update_node<'m>(
    ctx: &mut TranslateContext<'m>,
    update: &NodeUpdate<'m>,
    var: &Variable,
    depth: u32,
) -> Result<Vec<Clause>, TranslateError> {
    ctx.check_depth(depth)?;
    let entity = update.entity;
    let mut body = MutationBody::default();

    let mut before = Vec::new();
    for field_update in &update.fields {
        if let Some(auth) = &field_update.field.authorization {
            before.push(before_validation(ctx, Some(auth), UPDATE, entity, var)?);
        }
    }
    body.clauses.extend(filter_clauses(CompiledPredicate::and(before)));

    let items = update_items(ctx, update, var)?;
    if !items.is_empty() {
        body.clauses.push(Clause::Set(items));
    }

    let mut touched = HashSet::new();
    for entry in &update.relationships {
        relationship_update(ctx, entity, var, entry, depth + 1, &mut body)?;
        if !entry.connect.is_empty() || !entry.create.is_empty() {
            touched.insert(entry.relationship.name.as_str());
        }
    }
    for rel in entity
        .relationships
        .iter()
        .filter(|r| r.is_singular() && touched.contains(r.name.as_str()))
    {
        let check = cardinality_check(ctx, entity, rel, var)?;
        body.checks.push(check);
    }

    if !update.is_empty() {
        let checks = after_validation(ctx, entity.authorization.as_ref(), UPDATE, entity, var)?;
        body.checks.extend(checks);
    }
    for field_update in &update.fields {
        if let Some(auth) = &field_update.field.authorization {
            let checks = after_validation(ctx, Some(auth), UPDATE, entity, var)?;
            body.checks.extend(checks);
        }
    }
    Ok(body.into_clauses())
}

pub fn update<'m>(
    ctx: &mut TranslateContext<'m>,
    entity: &'m Entity,
    filter: Option<&FilterExpr<'m>>,
    update: &NodeUpdate<'m>,
    selection: &[Selection],
) -> Result<(Statement, ResultShape), TranslateError> {
    require_concrete(entity, "update")?;
    debug!(
        "Updating `{}`: {} fields, {} relationship operations",
        entity.name,
        update.fields.len(),
        update.relationships.len()
    );
    let this = Variable::new(RESULT_COLUMN);
    let predicate = member_filter(ctx, filter, entity, &this, UPDATE)?;
    let mut clauses = filtered_match(Pattern::node(node_pattern(&this, entity)), predicate, false);
    clauses.extend(update_node(ctx, update, &this, 1)?);
    barrier(&mut clauses);
    let (result, shape) = mutation_result(ctx, entity, &this, selection, true)?;
    clauses.extend(result);
    Ok((Statement::from_clauses(clauses), shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph_catalog::{GraphModel, GraphModelConfig};
    use crate::translate::mutation_input::parse_node_update;
    use crate::translate::operation::OperationOrigin;
    use crate::translate::where_input::parse_where;
    use serde_json::{json, Value};

    fn model() -> GraphModel {
        GraphModelConfig::from_yaml_str(
            r#"
entities:
  - name: Movie
    fields:
      - { name: title, type: String }
      - { name: views, type: Int }
      - { name: updatedAt, type: DateTime, timestamp: [UPDATE] }
    relationships:
      - { name: actors, type: ACTED_IN, direction: IN, target: Actor, properties: ActedIn }
      - { name: director, type: DIRECTED, direction: IN, target: Person, cardinality: one }
    authorization:
      validate:
        - operations: [UPDATE]
          when: [BEFORE]
          where: { node: { title_NOT: "Locked" }, jwt: { roles_INCLUDES: editor } }
  - name: Actor
    fields:
      - { name: name, type: String }
  - name: Person
    fields:
      - { name: name, type: String }
  - name: ActedIn
    kind: relationship_properties
    fields:
      - { name: role, type: String }
"#,
        )
        .unwrap()
        .build()
        .unwrap()
    }

    fn compile(claims: Option<Value>, where_input: Value, input: Value) -> Result<String, TranslateError> {
        let model = model();
        let config = CompilerConfig::default();
        let claims = claims.map(|c| c.as_object().unwrap().clone());
        let mut ctx =
            TranslateContext::new(&model, &config, claims, OperationOrigin::TopLevel).unwrap();
        let movie = model.entity("Movie").unwrap();
        let filter = parse_where(&ctx, movie, where_input.as_object().unwrap(), 1)?;
        let parsed = parse_node_update(&ctx, movie, input.as_object().unwrap(), 1)?;
        let selection = vec![Selection::Scalar("title".into())];
        let (statement, _) = update(&mut ctx, movie, Some(&filter), &parsed, &selection)?;
        Ok(statement.build().unwrap().cypher)
    }

    #[test]
    fn test_update_fields_and_edge() {
        let cypher = compile(
            Some(json!({ "roles": ["editor"] })),
            json!({ "title": "Old" }),
            json!({
                "title": "New",
                "views_INCREMENT": 1,
                "actors": [{ "where": { "node": { "name": "Al" } }, "update": { "edge": { "role": "Lead" } } }]
            }),
        )
        .unwrap();
        assert_eq!(
            cypher,
            "MATCH (this:Movie)\n\
WHERE (this.title = $this_title AND apoc.util.validatePredicate(NOT (NOT (this.title = $this_title_NOT)), \"Forbidden\", [0]))\n\
SET\n    this.title = $this_update_title,\n    this.views = this.views + $this_update_views_INCREMENT,\n    this.updatedAt = datetime()\n\
WITH *\n\
CALL {\n    WITH this\n    MATCH (this)<-[this1:ACTED_IN]-(this0:Actor)\n    WHERE this0.name = $this0_name\n    SET\n        this1.role = $this1_update_role\n    RETURN count(*) AS var2\n}\n\
RETURN collect(DISTINCT this { .title }) AS data"
        );
    }

    #[test]
    fn test_update_without_role_fails_matched_rows() {
        let cypher = compile(
            Some(json!({ "roles": ["viewer"] })),
            json!({}),
            json!({ "title": "New" }),
        )
        .unwrap();
        assert!(cypher.starts_with(
            "MATCH (this:Movie)\nWHERE apoc.util.validatePredicate(true, \"Forbidden\", [0])\nSET"
        ));
    }

    #[test]
    fn test_connect_to_singular_relationship_checks_cardinality() {
        let cypher = compile(
            Some(json!({ "roles": ["editor"] })),
            json!({}),
            json!({
                "director": {
                    "disconnect": { "where": { "node": { "name": "Old" } } },
                    "connect": { "where": { "node": { "name": "New" } } }
                }
            }),
        )
        .unwrap();
        let disconnect = cypher.find("DELETE this1").unwrap();
        let connect = cypher.find("MERGE (this)<-[").unwrap();
        let check = cypher.find("Movie.director must not have more than one node").unwrap();
        assert!(disconnect < connect && connect < check);
    }
}
