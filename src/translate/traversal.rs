//! Pattern helpers shared by the predicate, projection and mutation builders.

use super::predicate::CompiledPredicate;
use crate::cypher_builder::{
    Clause, Expr, MatchClause, NodePattern, Pattern, PatternDirection, RelationshipPattern,
    Variable, WithClause,
};
use crate::graph_catalog::{Entity, GraphModel, RelationshipDirection, RelationshipField};

/// `(var:Label)` for concrete entities, `(var)` for polymorphic ones
/// (those are restricted by [`label_guard`] instead).
pub fn node_pattern(var: &Variable, entity: &Entity) -> NodePattern {
    if entity.is_concrete() {
        NodePattern::labeled(var, &entity.labels)
    } else {
        NodePattern::new(var)
    }
}

/// `(parent)-[rel:TYPE]->(node)` in the relationship's declared direction.
pub fn related_path(
    parent: &Variable,
    relationship: &RelationshipField,
    rel_var: Option<&Variable>,
    node: NodePattern,
) -> Pattern {
    let direction = match relationship.direction {
        RelationshipDirection::Out => PatternDirection::Outgoing,
        RelationshipDirection::In => PatternDirection::Incoming,
    };
    Pattern::node(NodePattern::new(parent)).related(
        RelationshipPattern::new(rel_var, &relationship.rel_type, direction),
        node,
    )
}

/// `(var:Movie OR var:Series)` for interfaces and unions.
pub fn label_guard(model: &GraphModel, var: &Variable, entity: &Entity) -> Option<Expr> {
    if !entity.is_polymorphic() {
        return None;
    }
    Expr::or_all(
        model
            .concrete_entities(entity)
            .iter()
            .map(|member| Expr::has_labels(var, &member.labels))
            .collect(),
    )
}

/// MATCH followed by the predicate: inline WHERE when there are no
/// preludes, otherwise the preludes and then `WITH * WHERE ...`.
pub fn filtered_match(pattern: Pattern, compiled: CompiledPredicate, optional: bool) -> Vec<Clause> {
    let CompiledPredicate {
        predicate,
        preludes,
    } = compiled;
    let mut clauses = Vec::with_capacity(preludes.len() + 2);
    if preludes.is_empty() {
        let mut m = MatchClause::new(pattern).with_where(predicate);
        m.optional = optional;
        clauses.push(Clause::Match(m));
    } else {
        let mut m = MatchClause::new(pattern);
        m.optional = optional;
        clauses.push(Clause::Match(m));
        clauses.extend(preludes);
        clauses.push(Clause::With(WithClause::star().with_where(predicate)));
    }
    clauses
}

/// Preludes then `WITH * WHERE ...`, for predicates applied after the match.
pub fn filter_clauses(compiled: CompiledPredicate) -> Vec<Clause> {
    let CompiledPredicate {
        predicate,
        preludes,
    } = compiled;
    let mut clauses = preludes;
    if predicate.is_some() {
        clauses.push(Clause::With(WithClause::star().with_where(predicate)));
    }
    clauses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_builder::{Statement, ToCypher, RenderContext};
    use crate::graph_catalog::Cardinality;

    #[test]
    fn test_related_path_direction() {
        let rel = RelationshipField {
            name: "actors".into(),
            rel_type: "ACTED_IN".into(),
            direction: RelationshipDirection::In,
            target: "Actor".into(),
            properties: None,
            cardinality: Cardinality::Many,
            required: false,
        };
        let this = Variable::new("this");
        let actor = Variable::new("this0");
        let pattern = related_path(&this, &rel, None, NodePattern::labeled(&actor, &["Actor".into()]));
        assert_eq!(
            pattern.to_cypher(&mut RenderContext::new()).unwrap(),
            "(this)<-[:ACTED_IN]-(this0:Actor)"
        );
    }

    #[test]
    fn test_filtered_match_with_preludes_uses_with_where() {
        let this = Variable::new("this");
        let compiled = CompiledPredicate {
            predicate: Some(Expr::Raw("var0 = true".into())),
            preludes: vec![Clause::With(WithClause::star())],
        };
        let stmt = Statement::from_clauses(filtered_match(
            Pattern::node(NodePattern::new(&this)),
            compiled,
            false,
        ));
        assert_eq!(
            stmt.build().unwrap().cypher,
            "MATCH (this)\nWITH *\nWITH *\nWHERE var0 = true"
        );
    }
}
