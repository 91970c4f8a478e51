//! Relationship writes shared by the create and update builders: nested
//! creates, connect, disconnect, nested deletes and cardinality checks.

use log::trace;

use super::authorization::{after_validation, before_validation, match_phase};
use super::context::TranslateContext;
use super::errors::TranslateError;
use super::mutation_input::{ConnectInput, NestedCreate, NestedDelete, NodeInput};
use super::predicate::{compile_connection_filter, CompiledPredicate, FilterOptions};
use super::projection::member_filter;
use super::set_properties::create_items;
use super::traversal::{filtered_match, label_guard, node_pattern, related_path};
use super::where_input::ConnectionFilter;
use crate::cypher_builder::{
    CallClause, CallImports, Clause, Expr, MatchClause, NodePattern, Operator, Pattern,
    ProjectionItem, ReturnClause, Statement, Variable, WithClause,
};
use crate::graph_catalog::{AuthorizationOperation, Entity, RelationshipField};

pub(crate) const CREATE: &[AuthorizationOperation] = &[AuthorizationOperation::Create];
pub(crate) const UPDATE: &[AuthorizationOperation] = &[AuthorizationOperation::Update];
pub(crate) const DELETE: &[AuthorizationOperation] = &[AuthorizationOperation::Delete];
const CONNECT: &[AuthorizationOperation] = &[AuthorizationOperation::CreateRelationship];
const DISCONNECT: &[AuthorizationOperation] = &[AuthorizationOperation::DeleteRelationship];

/// Clauses of one mutation scope plus the checks that run once every write
/// in the scope is done.
#[derive(Debug, Default)]
pub(crate) struct MutationBody {
    pub clauses: Vec<Clause>,
    pub checks: Vec<Clause>,
}

fn is_write(clause: &Clause) -> bool {
    matches!(
        clause,
        Clause::Create(_) | Clause::Merge(_) | Clause::Set(_) | Clause::Delete { .. }
    )
}

/// `WITH *` when the last clause wrote, so a read or subquery may follow.
pub(crate) fn barrier(clauses: &mut Vec<Clause>) {
    if clauses.last().map(is_write).unwrap_or(false) {
        clauses.push(Clause::With(WithClause::star()));
    }
}

impl MutationBody {
    pub fn push_call(&mut self, call: Clause) {
        barrier(&mut self.clauses);
        self.clauses.push(call);
    }

    pub fn into_clauses(mut self) -> Vec<Clause> {
        if !matches!(self.checks.first(), None | Some(Clause::With(_))) {
            barrier(&mut self.clauses);
        }
        self.clauses.extend(self.checks);
        self.clauses
    }
}

/// `RETURN count(*) AS varN`: keeps exactly one row whatever matched.
pub(crate) fn count_return(ctx: &mut TranslateContext<'_>) -> Clause {
    let count = ctx.variable("var");
    Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
        Expr::CountStar,
        count.name(),
    )]))
}

/// Fails the query unless `var` has exactly one (required) or at most one
/// node through the singular relationship `rel`.
pub(crate) fn cardinality_check(
    ctx: &mut TranslateContext<'_>,
    entity: &Entity,
    rel: &RelationshipField,
    var: &Variable,
) -> Result<Clause, TranslateError> {
    let target = ctx.model.entity(&rel.target)?;
    let other = if target.is_concrete() {
        NodePattern::anonymous(&target.labels)
    } else {
        NodePattern::default()
    };
    let edge = ctx.variable("this");
    let count = ctx.variable("var");
    let (condition, message) = if rel.required {
        (
            Expr::eq(count.expr(), Expr::integer(1)),
            format!("{}.{} required exactly once", entity.name, rel.name),
        )
    } else {
        (
            Expr::binary(Operator::LessThanEqual, count.expr(), Expr::integer(1)),
            format!("{}.{} must not have more than one node", entity.name, rel.name),
        )
    };
    let check = ctx.predicate_unless(condition, message);
    let body = Statement::from_clauses(vec![
        Clause::Match(MatchClause::new(related_path(var, rel, Some(&edge), other))),
        Clause::With(
            WithClause::new(vec![ProjectionItem::aliased(
                Expr::function("count", vec![edge.expr()]),
                count.name(),
            )])
            .with_where(Some(check)),
        ),
        Clause::Return(ReturnClause::new(vec![ProjectionItem::variable(&count)])),
    ]);
    Ok(Clause::Call(CallClause::new(
        CallImports::Variables(vec![var.clone()]),
        body,
    )))
}

/// AFTER checks of a created node: the entity's rules, then the rules of
/// every field it sets.
fn created_validations<'m>(
    ctx: &mut TranslateContext<'m>,
    input: &NodeInput<'m>,
    var: &Variable,
) -> Result<Vec<Clause>, TranslateError> {
    let entity = input.entity;
    let mut clauses = after_validation(ctx, entity.authorization.as_ref(), CREATE, entity, var)?;
    for property in input.properties.iter().chain(&input.populated) {
        if let Some(auth) = &property.field.authorization {
            clauses.extend(after_validation(ctx, Some(auth), CREATE, entity, var)?);
        }
    }
    Ok(clauses)
}

/// `CREATE (var:Label) SET ..` followed by everything nested in `input`.
/// Checks are deferred to the end of the enclosing scope.
pub(crate) fn create_node<'m>(
    ctx: &mut TranslateContext<'m>,
    input: &NodeInput<'m>,
    var: &Variable,
    depth: u32,
    body: &mut MutationBody,
) -> Result<(), TranslateError> {
    ctx.check_depth(depth)?;
    let entity = input.entity;
    body.clauses
        .push(Clause::Create(vec![Pattern::node(NodePattern::labeled(var, &entity.labels))]));
    let items = create_items(ctx, input, var)?;
    if !items.is_empty() {
        body.clauses.push(Clause::Set(items));
    }
    for relationship in &input.relationships {
        let rel = relationship.relationship;
        for nested in &relationship.create {
            nested_create(ctx, var, rel, nested, depth + 1, body)?;
        }
        for connect in &relationship.connect {
            let call = connect_call(ctx, var, entity, rel, connect, depth + 1)?;
            body.push_call(call);
        }
    }
    for rel in entity.relationships.iter().filter(|r| r.is_singular()) {
        let check = cardinality_check(ctx, entity, rel, var)?;
        body.checks.push(check);
    }
    let validations = created_validations(ctx, input, var)?;
    body.checks.extend(validations);
    trace!("Created `{}` as {}", entity.name, var.name());
    Ok(())
}

/// A new related node and the edge from `parent` to it.
pub(crate) fn nested_create<'m>(
    ctx: &mut TranslateContext<'m>,
    parent: &Variable,
    rel: &'m RelationshipField,
    nested: &NestedCreate<'m>,
    depth: u32,
    body: &mut MutationBody,
) -> Result<(), TranslateError> {
    let node = ctx.variable("this");
    create_node(ctx, &nested.node, &node, depth, body)?;
    let edge = ctx.variable("this");
    body.clauses.push(Clause::Merge(related_path(
        parent,
        rel,
        Some(&edge),
        NodePattern::new(&node),
    )));
    if let Some(edge_input) = &nested.edge {
        let items = create_items(ctx, edge_input, &edge)?;
        if !items.is_empty() {
            body.clauses.push(Clause::Set(items));
        }
    }
    Ok(())
}

/// `CALL { WITH parent MATCH (target) WHERE .. MERGE (parent)-[..]-(target) }`
pub(crate) fn connect_call<'m>(
    ctx: &mut TranslateContext<'m>,
    parent: &Variable,
    parent_entity: &'m Entity,
    rel: &'m RelationshipField,
    connect: &ConnectInput<'m>,
    depth: u32,
) -> Result<Clause, TranslateError> {
    ctx.check_depth(depth)?;
    let target = connect.target;
    let node = ctx.variable("this");
    let filter = member_filter(ctx, connect.filter.as_ref(), target, &node, CONNECT)?;
    let parent_auth = before_validation(
        ctx,
        parent_entity.authorization.as_ref(),
        CONNECT,
        parent_entity,
        parent,
    )?;
    let mut predicate = CompiledPredicate::and(vec![filter, parent_auth]);
    predicate.push(label_guard(ctx.model, &node, target));

    let mut body = Statement::from_clauses(filtered_match(
        Pattern::node(node_pattern(&node, target)),
        predicate,
        false,
    ));
    let edge = ctx.variable("this");
    body.push(Clause::Merge(related_path(
        parent,
        rel,
        Some(&edge),
        NodePattern::new(&node),
    )));
    if let Some(edge_input) = &connect.edge {
        let items = create_items(ctx, edge_input, &edge)?;
        if !items.is_empty() {
            body.push(Clause::Set(items));
        }
    }
    let mut checks = after_validation(
        ctx,
        parent_entity.authorization.as_ref(),
        CONNECT,
        parent_entity,
        parent,
    )?;
    checks.extend(after_validation(ctx, target.authorization.as_ref(), CONNECT, target, &node)?);
    body.clauses.extend(checks);
    body.push(count_return(ctx));
    Ok(Clause::Call(CallClause::new(
        CallImports::Variables(vec![parent.clone()]),
        body,
    )))
}

/// Node and edge filter of a relationship operation, with the target's
/// match-phase authorization and label guard.
pub(crate) fn related_predicate<'m>(
    ctx: &mut TranslateContext<'m>,
    target: &'m Entity,
    filter: Option<&ConnectionFilter<'m>>,
    node: &Variable,
    edge: &Variable,
    operations: &[AuthorizationOperation],
) -> Result<CompiledPredicate, TranslateError> {
    let filter = match filter {
        Some(f) => compile_connection_filter(ctx, f, node, edge, FilterOptions::default())?,
        None => CompiledPredicate::default(),
    };
    let auth = match_phase(ctx, operations, target, node)?;
    let mut predicate = CompiledPredicate::and(vec![filter, auth]);
    predicate.push(label_guard(ctx.model, node, target));
    Ok(predicate)
}

/// `CALL { WITH parent MATCH (parent)-[edge]-(node) WHERE .. DELETE edge }`.
/// Matching nothing is a no-op.
pub(crate) fn disconnect_call<'m>(
    ctx: &mut TranslateContext<'m>,
    parent: &Variable,
    parent_entity: &'m Entity,
    rel: &'m RelationshipField,
    target: &'m Entity,
    filter: Option<&ConnectionFilter<'m>>,
    depth: u32,
) -> Result<Clause, TranslateError> {
    ctx.check_depth(depth)?;
    let node = ctx.variable("this");
    let edge = ctx.variable("this");
    let mut predicate = related_predicate(ctx, target, filter, &node, &edge, DISCONNECT)?;
    let parent_auth = before_validation(
        ctx,
        parent_entity.authorization.as_ref(),
        DISCONNECT,
        parent_entity,
        parent,
    )?;
    predicate = CompiledPredicate::and(vec![predicate, parent_auth]);

    let mut body = Statement::from_clauses(filtered_match(
        related_path(parent, rel, Some(&edge), node_pattern(&node, target)),
        predicate,
        false,
    ));
    body.push(Clause::Delete {
        detach: false,
        targets: vec![edge.expr()],
    });
    let mut checks = after_validation(
        ctx,
        parent_entity.authorization.as_ref(),
        DISCONNECT,
        parent_entity,
        parent,
    )?;
    checks.extend(after_validation(
        ctx,
        target.authorization.as_ref(),
        DISCONNECT,
        target,
        &node,
    )?);
    body.clauses.extend(checks);
    body.push(count_return(ctx));
    Ok(Clause::Call(CallClause::new(
        CallImports::Variables(vec![parent.clone()]),
        body,
    )))
}

/// `CALL { WITH parent MATCH .. <nested deletes> DETACH DELETE node }`.
/// Matching nothing is a no-op.
pub(crate) fn nested_delete_call<'m>(
    ctx: &mut TranslateContext<'m>,
    parent: &Variable,
    delete: &NestedDelete<'m>,
    depth: u32,
) -> Result<Clause, TranslateError> {
    ctx.check_depth(depth)?;
    let node = ctx.variable("this");
    let edge = ctx.variable("this");
    let predicate = related_predicate(
        ctx,
        delete.target,
        delete.filter.as_ref(),
        &node,
        &edge,
        DELETE,
    )?;
    let mut body = Statement::from_clauses(filtered_match(
        related_path(parent, delete.relationship, Some(&edge), node_pattern(&node, delete.target)),
        predicate,
        false,
    ));
    for nested in &delete.nested {
        body.push(nested_delete_call(ctx, &node, nested, depth + 1)?);
    }
    body.push(Clause::Delete {
        detach: true,
        targets: vec![node.expr()],
    });
    body.push(count_return(ctx));
    Ok(Clause::Call(CallClause::new(
        CallImports::Variables(vec![parent.clone()]),
        body,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph_catalog::{GraphModel, GraphModelConfig};
    use crate::translate::mutation_input::{parse_delete_input, parse_node_input};
    use crate::translate::operation::OperationOrigin;
    use serde_json::json;

    fn model() -> GraphModel {
        GraphModelConfig::from_yaml_str(
            r#"
entities:
  - name: Movie
    fields:
      - { name: title, type: String }
    relationships:
      - { name: actors, type: ACTED_IN, direction: IN, target: Actor, properties: ActedIn }
      - { name: director, type: DIRECTED, direction: IN, target: Person, cardinality: one, required: true }
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

    fn render(clauses: Vec<Clause>) -> String {
        Statement::from_clauses(clauses).build().unwrap().cypher
    }

    #[test]
    fn test_cardinality_check_required() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx =
            TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        let movie = model.entity("Movie").unwrap();
        let rel = movie.relationship("director").unwrap();
        let clause = cardinality_check(&mut ctx, movie, rel, &Variable::new("this")).unwrap();
        assert_eq!(
            render(vec![clause]),
            "CALL {\n    WITH this\n    MATCH (this)<-[this0:DIRECTED]-(:Person)\n    WITH count(this0) AS var1\n    WHERE apoc.util.validatePredicate(NOT (var1 = 1), \"Movie.director required exactly once\", [0])\n    RETURN var1\n}"
        );
    }

    #[test]
    fn test_nested_create_and_connect() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx =
            TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        let movie = model.entity("Movie").unwrap();
        let input = parse_node_input(
            &ctx,
            movie,
            &json!({
                "title": "Heat",
                "actors": {
                    "create": [{ "node": { "name": "Al" }, "edge": { "role": "Vincent" } }],
                    "connect": [{ "where": { "node": { "name": "Bob" } } }]
                }
            }),
            1,
        )
        .unwrap();
        let mut body = MutationBody::default();
        create_node(&mut ctx, &input, &Variable::new("this"), 1, &mut body).unwrap();
        let cypher = render(body.into_clauses());
        assert!(cypher.starts_with(
            "CREATE (this:Movie)\nSET\n    this.title = $this_title\nCREATE (this0:Actor)\nSET\n    this0.name = $this0_name\nMERGE (this)<-[this1:ACTED_IN]-(this0)\nSET\n    this1.role = $this1_role\nWITH *\nCALL {\n    WITH this\n    MATCH (this2:Actor)\n    WHERE this2.name = $this2_name\n    MERGE (this)<-[this3:ACTED_IN]-(this2)\n    RETURN count(*) AS var4\n}"
        ));
        assert!(cypher.contains("Movie.director required exactly once"));
    }

    #[test]
    fn test_nested_delete_is_recursive() {
        let model = GraphModelConfig::from_yaml_str(
            r#"
entities:
  - name: Movie
    fields:
      - { name: title, type: String }
    relationships:
      - { name: actors, type: ACTED_IN, direction: IN, target: Actor }
  - name: Actor
    fields:
      - { name: name, type: String }
    relationships:
      - { name: agents, type: REPRESENTS, direction: IN, target: Agent }
  - name: Agent
    fields:
      - { name: name, type: String }
"#,
        )
        .unwrap()
        .build()
        .unwrap();
        let config = CompilerConfig::default();
        let mut ctx =
            TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        let movie = model.entity("Movie").unwrap();
        let input = json!({ "actors": [{ "delete": { "agents": [{}] } }] });
        let deletes = parse_delete_input(&ctx, movie, input.as_object().unwrap(), 1).unwrap();
        let clause = nested_delete_call(&mut ctx, &Variable::new("this"), &deletes[0], 2).unwrap();
        assert_eq!(
            render(vec![clause]),
            "CALL {\n    WITH this\n    MATCH (this)<-[this1:ACTED_IN]-(this0:Actor)\n    CALL {\n        WITH this0\n        MATCH (this0)<-[this3:REPRESENTS]-(this2:Agent)\n        DETACH DELETE this2\n        RETURN count(*) AS var4\n    }\n    DETACH DELETE this0\n    RETURN count(*) AS var5\n}"
        );
    }
}
