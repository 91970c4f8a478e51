//! `<rel>Aggregate` filters: counts and per-field aggregations over the
//! related nodes (and edges) compared against a value.

use serde_json::{Map, Value};

use super::context::TranslateContext;
use super::errors::TranslateError;
use super::predicate::CompiledPredicate;
use super::traversal::{filtered_match, label_guard, node_pattern, related_path};
use crate::cypher_builder::{
    CallClause, CallImports, Clause, Expr, ListPredicate, Operator, ProjectionItem, Quantifier,
    ReturnClause, Statement, Variable,
};
use crate::graph_catalog::{Entity, Field, RelationshipField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ComparisonOperator {
    const SUFFIXES: [(&'static str, ComparisonOperator); 5] = [
        ("_EQUAL", ComparisonOperator::Equal),
        ("_GTE", ComparisonOperator::Gte),
        ("_LTE", ComparisonOperator::Lte),
        ("_GT", ComparisonOperator::Gt),
        ("_LT", ComparisonOperator::Lt),
    ];

    fn split_key(key: &str) -> Option<(&str, ComparisonOperator)> {
        Self::SUFFIXES
            .iter()
            .find_map(|(suffix, op)| key.strip_suffix(suffix).map(|name| (name, *op)))
    }

    fn operator(&self) -> Operator {
        match self {
            ComparisonOperator::Equal => Operator::Equal,
            ComparisonOperator::Gt => Operator::GreaterThan,
            ComparisonOperator::Gte => Operator::GreaterThanEqual,
            ComparisonOperator::Lt => Operator::LessThan,
            ComparisonOperator::Lte => Operator::LessThanEqual,
        }
    }
}

/// How the related values are reduced before the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMeasure {
    /// Any single related value satisfies the comparison
    Each,
    Min,
    Max,
    Sum,
    Average,
    ShortestLength,
    LongestLength,
    AverageLength,
}

impl AggregateMeasure {
    const SUFFIXES: [(&'static str, AggregateMeasure); 9] = [
        ("_SHORTEST_LENGTH", AggregateMeasure::ShortestLength),
        ("_LONGEST_LENGTH", AggregateMeasure::LongestLength),
        ("_AVERAGE_LENGTH", AggregateMeasure::AverageLength),
        ("_SHORTEST", AggregateMeasure::ShortestLength),
        ("_LONGEST", AggregateMeasure::LongestLength),
        ("_AVERAGE", AggregateMeasure::Average),
        ("_MIN", AggregateMeasure::Min),
        ("_MAX", AggregateMeasure::Max),
        ("_SUM", AggregateMeasure::Sum),
    ];

    fn accepts(&self, field: &Field) -> bool {
        let scalar = field.scalar();
        if field.is_list() {
            return false;
        }
        match self {
            AggregateMeasure::Each => {
                scalar.is_numeric() || scalar.is_temporal() || scalar.is_textual()
            }
            AggregateMeasure::Min | AggregateMeasure::Max => {
                scalar.is_numeric() || scalar.is_temporal()
            }
            AggregateMeasure::Sum => scalar.is_numeric(),
            AggregateMeasure::Average => scalar.is_numeric() || scalar.is_temporal(),
            AggregateMeasure::ShortestLength
            | AggregateMeasure::LongestLength
            | AggregateMeasure::AverageLength => scalar.is_textual(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateTarget {
    Node,
    Edge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateFilter<'m> {
    And(Vec<AggregateFilter<'m>>),
    Or(Vec<AggregateFilter<'m>>),
    Not(Box<AggregateFilter<'m>>),
    Count {
        key: String,
        operator: ComparisonOperator,
        value: Value,
    },
    Field {
        key: String,
        target: AggregateTarget,
        field: &'m Field,
        measure: AggregateMeasure,
        operator: ComparisonOperator,
        value: Value,
    },
}

fn mismatch(message: String, relationship: &RelationshipField) -> TranslateError {
    TranslateError::schema_mismatch_with_context(message, &format!("{}Aggregate", relationship.name))
}

fn expect_object<'v>(
    value: &'v Value,
    key: &str,
    relationship: &RelationshipField,
) -> Result<&'v Map<String, Value>, TranslateError> {
    value
        .as_object()
        .ok_or_else(|| mismatch(format!("`{}` expects an object", key), relationship))
}

pub fn parse_aggregate_where<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &'m RelationshipField,
    target: &'m Entity,
    input: &Map<String, Value>,
    depth: u32,
) -> Result<AggregateFilter<'m>, TranslateError> {
    ctx.check_depth(depth)?;
    let edge_entity = match &relationship.properties {
        Some(name) => Some(ctx.model.entity(name)?),
        None => None,
    };

    let mut items = Vec::with_capacity(input.len());
    for (key, value) in input {
        match key.as_str() {
            "AND" | "OR" => {
                let list = value
                    .as_array()
                    .ok_or_else(|| mismatch(format!("`{}` expects a list", key), relationship))?;
                let parsed = list
                    .iter()
                    .map(|item| {
                        parse_aggregate_where(
                            ctx,
                            relationship,
                            target,
                            expect_object(item, key, relationship)?,
                            depth + 1,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                items.push(if key == "AND" {
                    AggregateFilter::And(parsed)
                } else {
                    AggregateFilter::Or(parsed)
                });
            }
            "NOT" => {
                let inner = parse_aggregate_where(
                    ctx,
                    relationship,
                    target,
                    expect_object(value, key, relationship)?,
                    depth + 1,
                )?;
                items.push(AggregateFilter::Not(Box::new(inner)));
            }
            "node" => items.push(parse_fields(
                ctx,
                relationship,
                target,
                AggregateTarget::Node,
                expect_object(value, key, relationship)?,
                depth + 1,
            )?),
            "edge" => {
                let edge_entity = edge_entity.ok_or_else(|| {
                    mismatch(
                        "`edge` is not available on a relationship without properties".to_string(),
                        relationship,
                    )
                })?;
                items.push(parse_fields(
                    ctx,
                    relationship,
                    edge_entity,
                    AggregateTarget::Edge,
                    expect_object(value, key, relationship)?,
                    depth + 1,
                )?);
            }
            _ => items.push(parse_count(key, value, relationship)?),
        }
    }
    if items.len() == 1 {
        return Ok(items.remove(0));
    }
    Ok(AggregateFilter::And(items))
}

fn parse_count<'m>(
    key: &str,
    value: &Value,
    relationship: &RelationshipField,
) -> Result<AggregateFilter<'m>, TranslateError> {
    let operator = if key == "count" {
        Some(ComparisonOperator::Equal)
    } else {
        ComparisonOperator::split_key(key)
            .filter(|(name, _)| *name == "count")
            .map(|(_, op)| op)
    };
    let operator = operator
        .ok_or_else(|| mismatch(format!("unknown aggregate filter key `{}`", key), relationship))?;
    if !value.is_i64() && !value.is_u64() {
        return Err(mismatch(format!("`{}` expects an integer", key), relationship));
    }
    Ok(AggregateFilter::Count {
        key: key.to_string(),
        operator,
        value: value.clone(),
    })
}

fn parse_fields<'m>(
    ctx: &TranslateContext<'m>,
    relationship: &RelationshipField,
    entity: &'m Entity,
    target: AggregateTarget,
    input: &Map<String, Value>,
    depth: u32,
) -> Result<AggregateFilter<'m>, TranslateError> {
    ctx.check_depth(depth)?;
    let mut items = Vec::with_capacity(input.len());
    for (key, value) in input {
        match key.as_str() {
            "AND" | "OR" | "NOT" => {
                let nested = match value {
                    Value::Array(list) => list
                        .iter()
                        .map(|item| {
                            parse_fields(
                                ctx,
                                relationship,
                                entity,
                                target,
                                expect_object(item, key, relationship)?,
                                depth + 1,
                            )
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    other if key == "NOT" => vec![parse_fields(
                        ctx,
                        relationship,
                        entity,
                        target,
                        expect_object(other, key, relationship)?,
                        depth + 1,
                    )?],
                    _ => {
                        return Err(mismatch(format!("`{}` expects a list", key), relationship))
                    }
                };
                items.push(match key.as_str() {
                    "AND" => AggregateFilter::And(nested),
                    "OR" => AggregateFilter::Or(nested),
                    _ => AggregateFilter::Not(Box::new(AggregateFilter::And(nested))),
                });
            }
            _ => items.push(parse_field_key(relationship, entity, target, key, value)?),
        }
    }
    if items.len() == 1 {
        return Ok(items.remove(0));
    }
    Ok(AggregateFilter::And(items))
}

fn parse_field_key<'m>(
    relationship: &RelationshipField,
    entity: &'m Entity,
    target: AggregateTarget,
    key: &str,
    value: &Value,
) -> Result<AggregateFilter<'m>, TranslateError> {
    let unknown = || mismatch(format!("unknown aggregate filter key `{}`", key), relationship);
    let (rest, operator) = ComparisonOperator::split_key(key).ok_or_else(unknown)?;

    let (field, measure) = match entity.field(rest) {
        Some(field) => (field, AggregateMeasure::Each),
        None => AggregateMeasure::SUFFIXES
            .iter()
            .find_map(|(suffix, measure)| {
                rest.strip_suffix(suffix)
                    .and_then(|name| entity.field(name))
                    .map(|field| (field, *measure))
            })
            .ok_or_else(unknown)?,
    };

    if !measure.accepts(field) {
        return Err(mismatch(
            format!("`{}` is not a valid aggregation for field of type {}", key, field.scalar()),
            relationship,
        ));
    }
    if value.is_null() {
        return Err(mismatch(format!("`{}` does not accept null", key), relationship));
    }
    Ok(AggregateFilter::Field {
        key: key.to_string(),
        target,
        field,
        measure,
        operator,
        value: value.clone(),
    })
}

struct AggregateScope<'a> {
    node: &'a Variable,
    edge: &'a Variable,
}

fn compile_measure(
    ctx: &mut TranslateContext<'_>,
    filter: &AggregateFilter<'_>,
    scope: &AggregateScope<'_>,
) -> Result<Option<Expr>, TranslateError> {
    Ok(match filter {
        AggregateFilter::And(items) => Expr::and_all(
            items
                .iter()
                .map(|f| compile_measure(ctx, f, scope))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .flatten()
                .collect(),
        ),
        AggregateFilter::Or(items) => Expr::or_all(
            items
                .iter()
                .map(|f| compile_measure(ctx, f, scope))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .flatten()
                .collect(),
        ),
        AggregateFilter::Not(inner) => compile_measure(ctx, inner, scope)?.map(Expr::not),
        AggregateFilter::Count {
            key,
            operator,
            value,
        } => {
            let param = ctx.param(&format!("{}_{}", scope.node.name(), key), value.clone())?;
            Some(Expr::binary(
                operator.operator(),
                Expr::function("count", vec![scope.node.expr()]),
                param,
            ))
        }
        AggregateFilter::Field {
            key,
            target,
            field,
            measure,
            operator,
            value,
        } => {
            let owner = match target {
                AggregateTarget::Node => scope.node,
                AggregateTarget::Edge => scope.edge,
            };
            let param = ctx.param(&format!("{}_{}", owner.name(), key), value.clone())?;
            let property = owner.property(field.db_name());
            let op = operator.operator();
            let size = |e: Expr| Expr::function("size", vec![e]);
            Some(match measure {
                AggregateMeasure::Each => {
                    let var = ctx.variable("var");
                    let element = if field.scalar().is_textual()
                        && *operator != ComparisonOperator::Equal
                    {
                        size(var.expr())
                    } else {
                        var.expr()
                    };
                    Expr::ListPredicate(Box::new(ListPredicate {
                        quantifier: Quantifier::Any,
                        variable: var,
                        list: Expr::function("collect", vec![property]),
                        predicate: Expr::binary(op, element, param),
                    }))
                }
                AggregateMeasure::Min => {
                    Expr::binary(op, Expr::function("min", vec![property]), param)
                }
                AggregateMeasure::Max => {
                    Expr::binary(op, Expr::function("max", vec![property]), param)
                }
                AggregateMeasure::Sum => {
                    Expr::binary(op, Expr::function("sum", vec![property]), param)
                }
                AggregateMeasure::Average => {
                    Expr::binary(op, Expr::function("avg", vec![property]), param)
                }
                AggregateMeasure::ShortestLength => {
                    Expr::binary(op, Expr::function("min", vec![size(property)]), param)
                }
                AggregateMeasure::LongestLength => {
                    Expr::binary(op, Expr::function("max", vec![size(property)]), param)
                }
                AggregateMeasure::AverageLength => {
                    Expr::binary(op, Expr::function("avg", vec![size(property)]), param)
                }
            })
        }
    })
}

/// `CALL { WITH parent MATCH .. RETURN <aggregate test> AS varN }` plus
/// `varN = true` as the predicate.
pub fn compile_aggregate_filter<'m>(
    ctx: &mut TranslateContext<'m>,
    relationship: &'m RelationshipField,
    target: &'m Entity,
    filter: &AggregateFilter<'m>,
    parent: &Variable,
) -> Result<CompiledPredicate, TranslateError> {
    let node = ctx.variable("this");
    let edge = ctx.variable("this");
    let scope = AggregateScope {
        node: &node,
        edge: &edge,
    };
    let Some(test) = compile_measure(ctx, filter, &scope)? else {
        return Ok(CompiledPredicate::default());
    };
    let result = ctx.variable("var");

    let pattern = related_path(parent, relationship, Some(&edge), node_pattern(&node, target));
    let guard = CompiledPredicate::from_expr(label_guard(ctx.model, &node, target));
    let mut body = Statement::from_clauses(filtered_match(pattern, guard, false));
    body.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
        test,
        result.name(),
    )])));

    Ok(CompiledPredicate {
        predicate: Some(Expr::eq(result.expr(), Expr::boolean(true))),
        preludes: vec![Clause::Call(CallClause::new(
            CallImports::Variables(vec![parent.clone()]),
            body,
        ))],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::cypher_builder::{RenderContext, ToCypher};
    use crate::graph_catalog::{GraphModel, GraphModelConfig};
    use crate::translate::operation::OperationOrigin;
    use serde_json::json;
    use test_case::test_case;

    fn model() -> GraphModel {
        GraphModelConfig::from_yaml_str(
            r#"
entities:
  - name: Movie
    fields:
      - { name: title, type: String }
    relationships:
      - { name: actors, type: ACTED_IN, direction: IN, target: Actor, properties: ActedIn }
  - name: Actor
    fields:
      - { name: name, type: String }
      - { name: age, type: Int }
      - { name: born, type: DateTime }
  - name: ActedIn
    kind: relationship_properties
    fields:
      - { name: screenTime, type: Int }
"#,
        )
        .unwrap()
        .build()
        .unwrap()
    }

    fn compile(input: Value) -> Result<(String, String), TranslateError> {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx = TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel)?;
        let movie = model.entity("Movie")?;
        let actors = movie.relationship("actors").unwrap();
        let actor = model.entity("Actor")?;
        let filter = parse_aggregate_where(&ctx, actors, actor, input.as_object().unwrap(), 0)?;
        let compiled =
            compile_aggregate_filter(&mut ctx, actors, actor, &filter, &Variable::new("this"))?;
        let mut render = RenderContext::new();
        let prelude = Statement::from_clauses(compiled.preludes).to_cypher(&mut render)?;
        let predicate = compiled.predicate.unwrap().to_cypher(&mut render)?;
        Ok((prelude, predicate))
    }

    #[test]
    fn test_count_filter() {
        let (prelude, predicate) = compile(json!({ "count_GT": 2 })).unwrap();
        assert_eq!(
            prelude,
            "CALL {\n    WITH this\n    MATCH (this)<-[this1:ACTED_IN]-(this0:Actor)\n    RETURN count(this0) > $this0_count_GT AS var2\n}"
        );
        assert_eq!(predicate, "var2 = true");
    }

    #[test]
    fn test_string_gt_compares_length() {
        let (prelude, _) = compile(json!({ "node": { "name_GT": 3 } })).unwrap();
        assert!(
            prelude.contains("any(var2 IN collect(this0.name) WHERE size(var2) > $this0_name_GT)"),
            "{}",
            prelude
        );
    }

    #[test]
    fn test_string_equal_compares_value() {
        let (prelude, _) = compile(json!({ "node": { "name_EQUAL": "Keanu" } })).unwrap();
        assert!(prelude.contains("WHERE var2 = $this0_name_EQUAL"), "{}", prelude);
    }

    #[test_case(json!({ "node": { "age_MIN_LT": 30 } }), "min(this0.age) < $this0_age_MIN_LT" ; "min")]
    #[test_case(json!({ "node": { "age_AVERAGE_GTE": 30 } }), "avg(this0.age) >= $this0_age_AVERAGE_GTE" ; "average")]
    #[test_case(json!({ "node": { "name_SHORTEST_LENGTH_LT": 4 } }), "min(size(this0.name)) < $this0_name_SHORTEST_LENGTH_LT" ; "shortest")]
    #[test_case(json!({ "edge": { "screenTime_SUM_GT": 100 } }), "sum(this1.screenTime) > $this1_screenTime_SUM_GT" ; "edge sum")]
    #[test_case(json!({ "node": { "born_MAX_GT": "2000-01-01T00:00:00Z" } }), "max(this0.born) > $this0_born_MAX_GT" ; "temporal max")]
    fn test_measures(input: Value, expected: &str) {
        let (prelude, _) = compile(input).unwrap();
        assert!(prelude.contains(expected), "{}", prelude);
    }

    #[test]
    fn test_combinators_share_one_return() {
        let (prelude, _) = compile(json!({
            "OR": [{ "count": 1 }, { "NOT": { "node": { "age_MAX_GT": 80 } } }]
        }))
        .unwrap();
        assert!(
            prelude.contains(
                "RETURN (count(this0) = $this0_count OR NOT (max(this0.age) > $this0_age_MAX_GT)) AS var2"
            ),
            "{}",
            prelude
        );
    }

    #[test_case(json!({ "node": { "name_SUM_GT": 1 } }) ; "sum on string")]
    #[test_case(json!({ "node": { "age_SHORTEST_LENGTH_GT": 1 } }) ; "length on int")]
    #[test_case(json!({ "node": { "missing_GT": 1 } }) ; "unknown field")]
    #[test_case(json!({ "count_GT": "x" }) ; "non integer count")]
    #[test_case(json!({ "total": 1 }) ; "unknown key")]
    fn test_invalid_inputs(input: Value) {
        assert!(matches!(
            compile(input),
            Err(TranslateError::SchemaMismatch(_))
        ));
    }
}
