//! Compilation of filter trees into predicate expressions.

use serde_json::Value;

use super::aggregate_where::compile_aggregate_filter;
use super::context::TranslateContext;
use super::errors::TranslateError;
use super::traversal::{filtered_match, label_guard, node_pattern, related_path};
use super::where_input::{ConnectionFilter, FieldOperator, FilterExpr, RelationshipQuantifier};
use crate::cypher_builder::{
    Clause, Expr, ListComprehension, Operator, Statement, Variable,
};
use crate::graph_catalog::{Entity, Field, RelationshipField};

/// A predicate plus the subqueries it depends on. Preludes must run (in
/// order) before the clause that evaluates `predicate`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledPredicate {
    pub predicate: Option<Expr>,
    pub preludes: Vec<Clause>,
}

impl CompiledPredicate {
    pub fn from_expr(expr: Option<Expr>) -> Self {
        CompiledPredicate {
            predicate: expr,
            preludes: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.predicate.is_none() && self.preludes.is_empty()
    }

    pub fn and(parts: Vec<CompiledPredicate>) -> Self {
        Self::combine(parts, Expr::and_all)
    }

    pub fn or(parts: Vec<CompiledPredicate>) -> Self {
        Self::combine(parts, Expr::or_all)
    }

    fn combine(parts: Vec<CompiledPredicate>, join: fn(Vec<Expr>) -> Option<Expr>) -> Self {
        let mut predicates = Vec::with_capacity(parts.len());
        let mut preludes = Vec::new();
        for part in parts {
            predicates.extend(part.predicate);
            preludes.extend(part.preludes);
        }
        CompiledPredicate {
            predicate: join(predicates),
            preludes,
        }
    }

    pub fn negate(self) -> Self {
        CompiledPredicate {
            predicate: self.predicate.map(Expr::not),
            preludes: self.preludes,
        }
    }

    pub fn push(&mut self, expr: Option<Expr>) {
        if let Some(expr) = expr {
            self.predicate = Expr::and_all(self.predicate.take().into_iter().chain([expr]).collect());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterOptions {
    /// Read string values of the form `$jwt.<claim>` as claim references
    pub resolve_jwt: bool,
}

pub fn compile_filter<'m>(
    ctx: &mut TranslateContext<'m>,
    filter: &FilterExpr<'m>,
    node: &Variable,
    options: FilterOptions,
) -> Result<CompiledPredicate, TranslateError> {
    match filter {
        FilterExpr::And(items) => Ok(CompiledPredicate::and(
            items
                .iter()
                .map(|f| compile_filter(ctx, f, node, options))
                .collect::<Result<_, _>>()?,
        )),
        FilterExpr::Or(items) => Ok(CompiledPredicate::or(
            items
                .iter()
                .map(|f| compile_filter(ctx, f, node, options))
                .collect::<Result<_, _>>()?,
        )),
        FilterExpr::Not(inner) => Ok(compile_filter(ctx, inner, node, options)?.negate()),
        FilterExpr::Field {
            field,
            operator,
            value,
        } => Ok(CompiledPredicate::from_expr(Some(compile_field(
            ctx, field, *operator, value, node, options,
        )?))),
        FilterExpr::Relationship {
            relationship,
            target,
            quantifier,
            filter,
        } => compile_relationship(
            ctx,
            relationship,
            target,
            *quantifier,
            filter.as_deref().map(RelatedFilter::Node),
            node,
            options,
        ),
        FilterExpr::Connection {
            relationship,
            target,
            quantifier,
            filter,
        } => compile_relationship(
            ctx,
            relationship,
            target,
            *quantifier,
            filter.as_deref().map(RelatedFilter::Connection),
            node,
            options,
        ),
        FilterExpr::Aggregate {
            relationship,
            target,
            filter,
        } => compile_aggregate_filter(ctx, relationship, target, filter, node),
        FilterExpr::OnType { entity, filter } => {
            let mut compiled = compile_filter(ctx, filter, node, options)?;
            let labels = Expr::has_labels(node, &entity.labels);
            compiled.predicate = Expr::and_all(std::iter::once(labels).chain(compiled.predicate).collect());
            Ok(compiled)
        }
    }
}

/// Compile a node/edge filter over an already bound relationship.
pub fn compile_connection_filter<'m>(
    ctx: &mut TranslateContext<'m>,
    filter: &ConnectionFilter<'m>,
    node: &Variable,
    edge: &Variable,
    options: FilterOptions,
) -> Result<CompiledPredicate, TranslateError> {
    match filter {
        ConnectionFilter::And(items) => Ok(CompiledPredicate::and(
            items
                .iter()
                .map(|f| compile_connection_filter(ctx, f, node, edge, options))
                .collect::<Result<_, _>>()?,
        )),
        ConnectionFilter::Or(items) => Ok(CompiledPredicate::or(
            items
                .iter()
                .map(|f| compile_connection_filter(ctx, f, node, edge, options))
                .collect::<Result<_, _>>()?,
        )),
        ConnectionFilter::Not(inner) => {
            Ok(compile_connection_filter(ctx, inner, node, edge, options)?.negate())
        }
        ConnectionFilter::Node(f) => compile_filter(ctx, f, node, options),
        ConnectionFilter::Edge(f) => compile_filter(ctx, f, edge, options),
    }
}

fn point(expr: Expr) -> Expr {
    Expr::function("point", vec![expr])
}

fn point_list(ctx: &mut TranslateContext<'_>, list: Expr) -> Expr {
    let var = ctx.variable("var");
    Expr::ListComprehension(Box::new(ListComprehension {
        variable: var.clone(),
        list,
        filter: None,
        map: Some(point(var.expr())),
    }))
}

/// `"$jwt.sub"` -> `$jwt.sub`
fn jwt_reference(ctx: &TranslateContext<'_>, value: &Value) -> Option<Expr> {
    let claim = value.as_str()?.strip_prefix("$jwt.")?;
    let mut expr = ctx.jwt();
    for part in claim.split('.') {
        expr = expr.property(part);
    }
    Some(expr)
}

pub(crate) fn compile_field(
    ctx: &mut TranslateContext<'_>,
    field: &Field,
    operator: FieldOperator,
    value: &Value,
    node: &Variable,
    options: FilterOptions,
) -> Result<Expr, TranslateError> {
    let property = node.property(field.db_name());

    if value.is_null() {
        return match operator {
            FieldOperator::Equal => Ok(Expr::is_null(property)),
            FieldOperator::Not => Ok(Expr::is_not_null(property)),
            _ => Err(TranslateError::SchemaMismatch(format!(
                "`{}{}` does not accept null",
                field.name,
                operator.suffix()
            ))),
        };
    }

    let jwt = if options.resolve_jwt {
        jwt_reference(ctx, value)
    } else {
        None
    };
    let guard = jwt.clone().map(Expr::is_not_null);
    let raw = match jwt {
        Some(reference) => reference,
        None => ctx.param(
            &format!("{}_{}{}", node.name(), field.name, operator.suffix()),
            value.clone(),
        )?,
    };

    let is_point = field.scalar().is_point();

    let distance = |raw: &Expr| {
        (
            Expr::function(
                "point.distance",
                vec![property.clone(), point(raw.clone().property("point"))],
            ),
            raw.clone().property("distance"),
        )
    };

    let expr = match operator {
        FieldOperator::Equal | FieldOperator::Not => {
            let rhs = operand(ctx, raw, is_point, field.is_list());
            let eq = Expr::eq(property.clone(), rhs);
            if operator == FieldOperator::Not {
                Expr::not(eq)
            } else {
                eq
            }
        }
        FieldOperator::In | FieldOperator::NotIn => {
            let rhs = operand(ctx, raw, is_point, true);
            let within = Expr::binary(Operator::In, property.clone(), rhs);
            if operator == FieldOperator::NotIn {
                Expr::not(within)
            } else {
                within
            }
        }
        FieldOperator::Lt | FieldOperator::Lte | FieldOperator::Gt | FieldOperator::Gte => {
            let op = match operator {
                FieldOperator::Lt => Operator::LessThan,
                FieldOperator::Lte => Operator::LessThanEqual,
                FieldOperator::Gt => Operator::GreaterThan,
                _ => Operator::GreaterThanEqual,
            };
            if is_point {
                let (lhs, rhs) = distance(&raw);
                Expr::binary(op, lhs, rhs)
            } else {
                Expr::binary(op, property.clone(), raw)
            }
        }
        FieldOperator::Distance => {
            let (lhs, rhs) = distance(&raw);
            Expr::eq(lhs, rhs)
        }
        FieldOperator::Contains | FieldOperator::NotContains => {
            let e = Expr::binary(Operator::Contains, property.clone(), raw);
            negate_if(e, operator == FieldOperator::NotContains)
        }
        FieldOperator::StartsWith | FieldOperator::NotStartsWith => {
            let e = Expr::binary(Operator::StartsWith, property.clone(), raw);
            negate_if(e, operator == FieldOperator::NotStartsWith)
        }
        FieldOperator::EndsWith | FieldOperator::NotEndsWith => {
            let e = Expr::binary(Operator::EndsWith, property.clone(), raw);
            negate_if(e, operator == FieldOperator::NotEndsWith)
        }
        FieldOperator::Matches => Expr::binary(Operator::RegexMatch, property.clone(), raw),
        FieldOperator::Includes | FieldOperator::NotIncludes => {
            let element = operand(ctx, raw, is_point, false);
            let e = Expr::binary(Operator::In, element, property.clone());
            negate_if(e, operator == FieldOperator::NotIncludes)
        }
    };

    Ok(match guard {
        Some(guard) => Expr::and_all(vec![guard, expr]).unwrap_or_else(|| Expr::boolean(true)),
        None => expr,
    })
}

/// Value as compared against the stored property.
pub(crate) fn operand(ctx: &mut TranslateContext<'_>, raw: Expr, is_point: bool, list: bool) -> Expr {
    match (is_point, list) {
        (true, true) => point_list(ctx, raw),
        (true, false) => point(raw),
        (false, _) => raw,
    }
}

fn negate_if(expr: Expr, negate: bool) -> Expr {
    if negate {
        Expr::not(expr)
    } else {
        expr
    }
}

enum RelatedFilter<'a, 'm> {
    Node(&'a FilterExpr<'m>),
    Connection(&'a ConnectionFilter<'m>),
}

/// Existential subquery over one relationship, in the quantifier's idiom:
/// SOME `EXISTS`, NONE `NOT EXISTS`, ALL `EXISTS AND NOT EXISTS (.. NOT ..)`,
/// SINGLE `COUNT { } = 1`.
fn compile_relationship<'m>(
    ctx: &mut TranslateContext<'m>,
    relationship: &'m RelationshipField,
    target: &'m Entity,
    quantifier: RelationshipQuantifier,
    filter: Option<RelatedFilter<'_, 'm>>,
    parent: &Variable,
    options: FilterOptions,
) -> Result<CompiledPredicate, TranslateError> {
    let related = ctx.variable("this");
    let edge = match filter {
        Some(RelatedFilter::Connection(_)) => Some(ctx.variable("this")),
        _ => None,
    };
    let pattern = related_path(
        parent,
        relationship,
        edge.as_ref(),
        node_pattern(&related, target),
    );
    let guard = label_guard(ctx.model, &related, target);

    let subquery = |inner: Option<CompiledPredicate>, negate: bool| {
        let mut compiled = inner.unwrap_or_default();
        if negate {
            compiled = compiled.negate();
        }
        if let Some(guard) = &guard {
            compiled.predicate =
                Expr::and_all(std::iter::once(guard.clone()).chain(compiled.predicate).collect());
        }
        Box::new(Statement::from_clauses(filtered_match(pattern.clone(), compiled, false)))
    };

    let Some(filter) = filter else {
        return match quantifier {
            RelationshipQuantifier::Some => Ok(CompiledPredicate::from_expr(Some(Expr::not(
                Expr::Exists(subquery(None, false)),
            )))),
            RelationshipQuantifier::None => Ok(CompiledPredicate::from_expr(Some(Expr::Exists(
                subquery(None, false),
            )))),
            _ => Err(TranslateError::SchemaMismatch(format!(
                "`{}` filter with ALL or SINGLE does not accept null",
                relationship.name
            ))),
        };
    };

    let inner = match filter {
        RelatedFilter::Node(f) => compile_filter(ctx, f, &related, options)?,
        RelatedFilter::Connection(f) => match &edge {
            Some(edge) => compile_connection_filter(ctx, f, &related, edge, options)?,
            None => CompiledPredicate::default(),
        },
    };
    let has_predicate = inner.predicate.is_some();

    let expr = match quantifier {
        RelationshipQuantifier::Some => Expr::Exists(subquery(Some(inner), false)),
        RelationshipQuantifier::None => Expr::not(Expr::Exists(subquery(Some(inner), false))),
        RelationshipQuantifier::Single => Expr::eq(
            Expr::CountSubquery(subquery(Some(inner), false)),
            Expr::integer(1),
        ),
        RelationshipQuantifier::All if !has_predicate => Expr::Exists(subquery(Some(inner), false)),
        RelationshipQuantifier::All => {
            let some = Expr::Exists(subquery(Some(inner.clone()), false));
            let violating = Expr::Exists(subquery(Some(inner), true));
            Expr::and_all(vec![some, Expr::not(violating)]).unwrap_or_else(|| Expr::boolean(true))
        }
    };
    Ok(CompiledPredicate::from_expr(Some(expr)))
}
