//! Authorization rule injection.
//!
//! Each rule is decided as far as possible while compiling: claim
//! conditions (`jwt`) and `requireAuthentication` are evaluated against the
//! caller's claims, so only node conditions reach the emitted query. A group
//! of rules that is statically satisfied adds nothing. A validate group that
//! can never be satisfied aborts a create before any query exists; on matched
//! rows it becomes an unconditional per-row failure, so matching nothing
//! still succeeds.

use log::{debug, warn};
use regex::Regex;
use serde_json::{Map, Value};

use super::context::TranslateContext;
use super::errors::TranslateError;
use super::predicate::{compile_filter, CompiledPredicate, FilterOptions};
use super::where_input::{parse_where, FieldOperator};
use crate::cypher_builder::{Clause, Expr, Variable, WithClause};
use crate::graph_catalog::{
    AuthorizationAnnotation, AuthorizationOperation, AuthorizationRule, AuthorizationTiming,
    AuthorizationWhere, Entity,
};

/// Outcome of evaluating a rule (or part of one) at compile time.
#[derive(Debug, Clone, PartialEq)]
enum Decision {
    Static(bool),
    Dynamic(CompiledPredicate),
}

impl Decision {
    fn and(self, other: Decision) -> Decision {
        match (self, other) {
            (Decision::Static(false), _) | (_, Decision::Static(false)) => Decision::Static(false),
            (Decision::Static(true), d) | (d, Decision::Static(true)) => d,
            (Decision::Dynamic(a), Decision::Dynamic(b)) => {
                Decision::Dynamic(CompiledPredicate::and(vec![a, b]))
            }
        }
    }

    fn or(self, other: Decision) -> Decision {
        match (self, other) {
            (Decision::Static(true), _) | (_, Decision::Static(true)) => Decision::Static(true),
            (Decision::Static(false), d) | (d, Decision::Static(false)) => d,
            (Decision::Dynamic(a), Decision::Dynamic(b)) => {
                Decision::Dynamic(CompiledPredicate::or(vec![a, b]))
            }
        }
    }

    fn negate(self) -> Decision {
        match self {
            Decision::Static(b) => Decision::Static(!b),
            Decision::Dynamic(p) => Decision::Dynamic(p.negate()),
        }
    }
}

fn claim<'c>(claims: &'c Map<String, Value>, path: &str) -> Option<&'c Value> {
    let mut parts = path.split('.');
    let mut current = claims.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_claim(actual: Option<&Value>, operator: FieldOperator, expected: &Value) -> bool {
    use std::cmp::Ordering::*;
    let actual = actual.unwrap_or(&Value::Null);
    let text = |f: fn(&str, &str) -> bool| match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) => f(a, e),
        _ => false,
    };
    match operator {
        FieldOperator::Equal => values_equal(actual, expected),
        FieldOperator::Not => !values_equal(actual, expected),
        FieldOperator::In => expected
            .as_array()
            .map(|list| list.iter().any(|v| values_equal(actual, v)))
            .unwrap_or(false),
        FieldOperator::NotIn => !compare_claim(Some(actual), FieldOperator::In, expected),
        FieldOperator::Lt => ordering(actual, expected) == Some(Less),
        FieldOperator::Lte => matches!(ordering(actual, expected), Some(Less | Equal)),
        FieldOperator::Gt => ordering(actual, expected) == Some(Greater),
        FieldOperator::Gte => matches!(ordering(actual, expected), Some(Greater | Equal)),
        FieldOperator::Contains => text(|a, e| a.contains(e)),
        FieldOperator::NotContains => !text(|a, e| a.contains(e)),
        FieldOperator::StartsWith => text(|a, e| a.starts_with(e)),
        FieldOperator::NotStartsWith => !text(|a, e| a.starts_with(e)),
        FieldOperator::EndsWith => text(|a, e| a.ends_with(e)),
        FieldOperator::NotEndsWith => !text(|a, e| a.ends_with(e)),
        FieldOperator::Matches => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(pattern)) => match Regex::new(&format!("^(?:{})$", pattern)) {
                Ok(re) => re.is_match(a),
                Err(e) => {
                    warn!("Ignoring invalid claim pattern `{}`: {}", pattern, e);
                    false
                }
            },
            _ => false,
        },
        FieldOperator::Includes => actual
            .as_array()
            .map(|list| list.iter().any(|v| values_equal(v, expected)))
            .unwrap_or(false),
        FieldOperator::NotIncludes => !compare_claim(Some(actual), FieldOperator::Includes, expected),
        FieldOperator::Distance => false,
    }
}

/// `{ roles_INCLUDES: "admin", sub: "u1" }` against the caller's claims.
fn evaluate_claims(claims: Option<&Map<String, Value>>, conditions: &Map<String, Value>) -> bool {
    let Some(claims) = claims else {
        return false;
    };
    conditions.iter().all(|(key, expected)| {
        let candidates = FieldOperator::split_key(key);
        // a claim literally named like the key wins over an operator suffix
        let (name, operator) = candidates
            .iter()
            .find(|(name, _)| claim(claims, name).is_some())
            .or_else(|| candidates.get(1))
            .or_else(|| candidates.first())
            .copied()
            .unwrap_or((key.as_str(), FieldOperator::Equal));
        compare_claim(claim(claims, name), operator, expected)
    })
}

fn evaluate_where<'m>(
    ctx: &mut TranslateContext<'m>,
    condition: &AuthorizationWhere,
    entity: &'m Entity,
    node: &Variable,
    depth: u32,
) -> Result<Decision, TranslateError> {
    ctx.check_depth(depth)?;
    let mut decision = Decision::Static(true);

    if let Some(jwt) = &condition.jwt {
        decision = decision.and(Decision::Static(evaluate_claims(ctx.claims(), jwt)));
    }
    if let Some(node_condition) = &condition.node {
        let filter = parse_where(ctx, entity, node_condition, depth + 1)?;
        let compiled =
            compile_filter(ctx, &filter, node, FilterOptions { resolve_jwt: true })?;
        if !compiled.is_empty() {
            decision = decision.and(Decision::Dynamic(compiled));
        }
    }
    for part in &condition.and {
        decision = decision.and(evaluate_where(ctx, part, entity, node, depth + 1)?);
    }
    if !condition.or.is_empty() {
        let mut any = Decision::Static(false);
        for part in &condition.or {
            any = any.or(evaluate_where(ctx, part, entity, node, depth + 1)?);
        }
        decision = decision.and(any);
    }
    if let Some(not) = &condition.not {
        decision = decision.and(evaluate_where(ctx, not, entity, node, depth + 1)?.negate());
    }
    Ok(decision)
}

fn evaluate_rule<'m>(
    ctx: &mut TranslateContext<'m>,
    rule: &AuthorizationRule,
    entity: &'m Entity,
    node: &Variable,
) -> Result<Decision, TranslateError> {
    if rule.require_authentication && !ctx.is_authenticated() {
        return Ok(Decision::Static(false));
    }
    evaluate_where(ctx, &rule.where_clause, entity, node, 0)
}

/// OR over the rules; `None` when there are no rules to apply.
fn evaluate_group<'m, 'r>(
    ctx: &mut TranslateContext<'m>,
    rules: impl Iterator<Item = &'r AuthorizationRule>,
    entity: &'m Entity,
    node: &Variable,
) -> Result<Option<Decision>, TranslateError> {
    let mut group: Option<Decision> = None;
    for rule in rules {
        let decision = evaluate_rule(ctx, rule, entity, node)?;
        group = Some(match group {
            Some(acc) => acc.or(decision),
            None => decision,
        });
    }
    Ok(group)
}

fn enabled<'a>(
    ctx: &TranslateContext<'_>,
    annotation: Option<&'a AuthorizationAnnotation>,
) -> Option<&'a AuthorizationAnnotation> {
    if !ctx.config.authorization {
        return None;
    }
    annotation.filter(|a| !a.is_empty())
}

/// Row filter from `filter` rules, for the match phase.
///
/// A group that can never hold filters every row out with `false`.
pub fn filter_predicate<'m>(
    ctx: &mut TranslateContext<'m>,
    annotation: Option<&AuthorizationAnnotation>,
    operations: &[AuthorizationOperation],
    entity: &'m Entity,
    node: &Variable,
) -> Result<CompiledPredicate, TranslateError> {
    let Some(annotation) = enabled(ctx, annotation) else {
        return Ok(CompiledPredicate::default());
    };
    let rules = annotation.filter.iter().filter(|r| r.applies_to(operations));
    Ok(match evaluate_group(ctx, rules, entity, node)? {
        None | Some(Decision::Static(true)) => CompiledPredicate::default(),
        Some(Decision::Static(false)) => {
            debug!("No filter rule on `{}` can hold, excluding every row", entity.name);
            CompiledPredicate::from_expr(Some(Expr::boolean(false)))
        }
        Some(Decision::Dynamic(predicate)) => predicate,
    })
}

/// Applicable validate rules decided down to what must be checked in the
/// database; `Ok(None)` when nothing needs checking.
fn validation<'m>(
    ctx: &mut TranslateContext<'m>,
    annotation: Option<&AuthorizationAnnotation>,
    operations: &[AuthorizationOperation],
    timing: AuthorizationTiming,
    entity: &'m Entity,
    node: &Variable,
) -> Result<Option<CompiledPredicate>, TranslateError> {
    let Some(annotation) = enabled(ctx, annotation) else {
        return Ok(None);
    };
    let rules = annotation
        .validate
        .iter()
        .filter(|r| r.applies_to(operations) && r.applies_at(timing));
    match evaluate_group(ctx, rules, entity, node)? {
        None | Some(Decision::Static(true)) => Ok(None),
        // a create always has a row to check
        Some(Decision::Static(false))
            if matches!(operations, [AuthorizationOperation::Create]) =>
        {
            debug!("Validate rules on `{}` can never hold for a create", entity.name);
            Err(ctx.forbidden())
        }
        Some(Decision::Static(false)) => {
            debug!(
                "Validate rules on `{}` can never hold, rejecting every matched row",
                entity.name
            );
            Ok(Some(CompiledPredicate::from_expr(Some(Expr::boolean(false)))))
        }
        Some(Decision::Dynamic(predicate)) => Ok(Some(predicate)),
    }
}

/// BEFORE validation, as an `apoc.util.validatePredicate` term for the
/// match-phase WHERE.
pub fn before_validation<'m>(
    ctx: &mut TranslateContext<'m>,
    annotation: Option<&AuthorizationAnnotation>,
    operations: &[AuthorizationOperation],
    entity: &'m Entity,
    node: &Variable,
) -> Result<CompiledPredicate, TranslateError> {
    let Some(allowed) = validation(
        ctx,
        annotation,
        operations,
        AuthorizationTiming::Before,
        entity,
        node,
    )?
    else {
        return Ok(CompiledPredicate::default());
    };
    Ok(CompiledPredicate {
        predicate: allowed.predicate.map(|p| ctx.validate_predicate(p)),
        preludes: allowed.preludes,
    })
}

/// AFTER validation: `WITH *`, any subqueries, then
/// `CALL apoc.util.validate(..)`.
pub fn after_validation<'m>(
    ctx: &mut TranslateContext<'m>,
    annotation: Option<&AuthorizationAnnotation>,
    operations: &[AuthorizationOperation],
    entity: &'m Entity,
    node: &Variable,
) -> Result<Vec<Clause>, TranslateError> {
    let Some(allowed) = validation(
        ctx,
        annotation,
        operations,
        AuthorizationTiming::After,
        entity,
        node,
    )?
    else {
        return Ok(vec![]);
    };
    let Some(predicate) = allowed.predicate else {
        return Ok(vec![]);
    };
    let mut clauses = vec![Clause::With(WithClause::star())];
    clauses.extend(allowed.preludes);
    clauses.push(ctx.validate_procedure(predicate));
    Ok(clauses)
}

/// AFTER validation that passes whenever `unless` holds, e.g. for rows that
/// do not set the field being checked.
pub fn after_validation_unless<'m>(
    ctx: &mut TranslateContext<'m>,
    annotation: Option<&AuthorizationAnnotation>,
    operations: &[AuthorizationOperation],
    entity: &'m Entity,
    node: &Variable,
    unless: Expr,
) -> Result<Vec<Clause>, TranslateError> {
    let Some(allowed) = validation(
        ctx,
        annotation,
        operations,
        AuthorizationTiming::After,
        entity,
        node,
    )?
    else {
        return Ok(vec![]);
    };
    let Some(predicate) = allowed.predicate else {
        return Ok(vec![]);
    };
    let condition = Expr::or_all(vec![unless, predicate]).unwrap_or_else(|| Expr::boolean(true));
    let mut clauses = vec![Clause::With(WithClause::star())];
    clauses.extend(allowed.preludes);
    clauses.push(ctx.validate_procedure(condition));
    Ok(clauses)
}

/// Entity-level filter and BEFORE validation combined, as used by every
/// match phase.
pub fn match_phase<'m>(
    ctx: &mut TranslateContext<'m>,
    operations: &[AuthorizationOperation],
    entity: &'m Entity,
    node: &Variable,
) -> Result<CompiledPredicate, TranslateError> {
    let annotation = entity.authorization.as_ref();
    let filter = filter_predicate(ctx, annotation, operations, entity, node)?;
    let validate = before_validation(ctx, annotation, operations, entity, node)?;
    Ok(CompiledPredicate::and(vec![filter, validate]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::cypher_builder::{RenderContext, Statement, ToCypher};
    use crate::graph_catalog::{GraphModel, GraphModelConfig};
    use crate::translate::operation::OperationOrigin;
    use serde_json::json;
    use test_case::test_case;

    const READ: &[AuthorizationOperation] = &[AuthorizationOperation::Read];

    fn model() -> GraphModel {
        GraphModelConfig::from_yaml_str(
            r#"
entities:
  - name: Post
    fields:
      - { name: owner, type: String }
      - { name: published, type: Boolean }
    authorization:
      filter:
        - operations: [READ]
          where: { node: { owner: "$jwt.sub" } }
        - operations: [READ]
          where: { jwt: { roles_INCLUDES: admin } }
      validate:
        - operations: [UPDATE]
          when: [BEFORE]
          where: { node: { owner: "$jwt.sub" } }
        - operations: [DELETE]
          where: { jwt: { roles_INCLUDES: admin } }
        - operations: [CREATE]
          when: [AFTER]
          requireAuthentication: false
          where: { node: { published: false } }
"#,
        )
        .unwrap()
        .build()
        .unwrap()
    }

    fn render(expr: &Expr) -> String {
        expr.to_cypher(&mut RenderContext::new()).unwrap()
    }

    fn claims(value: Value) -> Option<Map<String, Value>> {
        value.as_object().cloned()
    }

    #[test]
    fn test_filter_with_claim_reference() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx = TranslateContext::new(
            &model,
            &config,
            claims(json!({ "sub": "u1", "roles": [] })),
            OperationOrigin::TopLevel,
        )
        .unwrap();
        let post = model.entity("Post").unwrap();
        let compiled = match_phase(&mut ctx, READ, post, &Variable::new("this")).unwrap();
        assert_eq!(
            render(&compiled.predicate.unwrap()),
            "($jwt.sub IS NOT NULL AND this.owner = $jwt.sub)"
        );
    }

    #[test]
    fn test_statically_true_rule_lifts_filter() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx = TranslateContext::new(
            &model,
            &config,
            claims(json!({ "sub": "u1", "roles": ["admin"] })),
            OperationOrigin::TopLevel,
        )
        .unwrap();
        let post = model.entity("Post").unwrap();
        let compiled = match_phase(&mut ctx, READ, post, &Variable::new("this")).unwrap();
        assert!(compiled.is_empty());
    }

    #[test]
    fn test_unauthenticated_filter_excludes_everything() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx =
            TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        let post = model.entity("Post").unwrap();
        let compiled = match_phase(&mut ctx, READ, post, &Variable::new("this")).unwrap();
        assert_eq!(render(&compiled.predicate.unwrap()), "false");
    }

    #[test]
    fn test_before_validation_renders_validate_predicate() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx = TranslateContext::new(
            &model,
            &config,
            claims(json!({ "sub": "u1" })),
            OperationOrigin::TopLevel,
        )
        .unwrap();
        let post = model.entity("Post").unwrap();
        let compiled = match_phase(
            &mut ctx,
            &[AuthorizationOperation::Update],
            post,
            &Variable::new("this"),
        )
        .unwrap();
        assert_eq!(
            render(&compiled.predicate.unwrap()),
            "apoc.util.validatePredicate(NOT ($jwt.sub IS NOT NULL AND this.owner = $jwt.sub), \"Forbidden\", [0])"
        );
    }

    #[test]
    fn test_statically_false_validate_fails_each_matched_row() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx = TranslateContext::new(
            &model,
            &config,
            claims(json!({ "roles": ["user"] })),
            OperationOrigin::TopLevel,
        )
        .unwrap();
        let post = model.entity("Post").unwrap();
        let compiled = match_phase(
            &mut ctx,
            &[AuthorizationOperation::Delete],
            post,
            &Variable::new("this"),
        )
        .unwrap();
        assert_eq!(
            render(&compiled.predicate.unwrap()),
            "apoc.util.validatePredicate(true, \"Forbidden\", [0])"
        );
    }

    #[test]
    fn test_statically_false_create_validate_is_forbidden() {
        let model = GraphModelConfig::from_yaml_str(
            r#"
entities:
  - name: Post
    fields:
      - { name: owner, type: String }
    authorization:
      validate:
        - operations: [CREATE]
          when: [AFTER]
          where: { jwt: { roles_INCLUDES: admin } }
"#,
        )
        .unwrap()
        .build()
        .unwrap();
        let config = CompilerConfig::default();
        let mut ctx = TranslateContext::new(
            &model,
            &config,
            claims(json!({ "roles": ["user"] })),
            OperationOrigin::TopLevel,
        )
        .unwrap();
        let post = model.entity("Post").unwrap();
        let err = after_validation(
            &mut ctx,
            post.authorization.as_ref(),
            &[AuthorizationOperation::Create],
            post,
            &Variable::new("this0"),
        )
        .unwrap_err();
        assert_eq!(err, TranslateError::ForbiddenByAuthorization("Forbidden".into()));
    }

    #[test]
    fn test_after_validation_without_authentication() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx =
            TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        let post = model.entity("Post").unwrap();
        let clauses = after_validation(
            &mut ctx,
            post.authorization.as_ref(),
            &[AuthorizationOperation::Create],
            post,
            &Variable::new("this0"),
        )
        .unwrap();
        let text = Statement::from_clauses(clauses).build().unwrap().cypher;
        assert_eq!(
            text,
            "WITH *\nCALL apoc.util.validate(NOT (this0.published = $this0_published), \"Forbidden\", [0])"
        );
    }

    #[test]
    fn test_disabled_authorization_adds_nothing() {
        let model = model();
        let config = CompilerConfig {
            authorization: false,
            ..Default::default()
        };
        let mut ctx =
            TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        let post = model.entity("Post").unwrap();
        let compiled = match_phase(
            &mut ctx,
            &[AuthorizationOperation::Delete],
            post,
            &Variable::new("this"),
        )
        .unwrap();
        assert!(compiled.is_empty());
    }

    #[test_case(json!({ "sub": "a" }), json!({ "sub": "a" }), true ; "equal")]
    #[test_case(json!({ "level": 3 }), json!({ "level_GT": 2 }), true ; "greater")]
    #[test_case(json!({ "level": 3.0 }), json!({ "level": 3 }), true ; "numeric equality")]
    #[test_case(json!({ "email": "a@corp.io" }), json!({ "email_ENDS_WITH": "@corp.io" }), true ; "ends with")]
    #[test_case(json!({ "email": "a@corp.io" }), json!({ "email_MATCHES": ".*@other" }), false ; "matches")]
    #[test_case(json!({ "role": "x" }), json!({ "role_IN": ["x", "y"] }), true ; "in")]
    #[test_case(json!({ "org": { "id": 7 } }), json!({ "org.id": 7 }), true ; "nested claim")]
    #[test_case(json!({}), json!({ "sub_NOT": "a" }), true ; "missing claim is null")]
    #[test_case(json!({}), json!({ "sub": "a" }), false ; "missing claim never equals")]
    fn test_claim_evaluation(actual: Value, conditions: Value, expected: bool) {
        assert_eq!(
            evaluate_claims(actual.as_object(), conditions.as_object().unwrap()),
            expected
        );
    }
}
