//! Sort inputs: `[{ "title": "ASC" }, { "actorsAggregate": { "count": "DESC" } }]`.

use serde_json::{Map, Value};

use super::context::TranslateContext;
use super::errors::TranslateError;
use super::traversal::{label_guard, node_pattern, related_path};
use crate::cypher_builder::{
    CallClause, CallImports, Clause, Expr, MatchClause, NodePattern, OrderByItem, ProjectionItem,
    ReturnClause, SortDirection, Statement, Variable,
};
use crate::graph_catalog::{Entity, Field, RelationshipField};

#[derive(Debug, Clone, PartialEq)]
pub enum SortTarget<'m> {
    Field(&'m Field),
    /// Number of related nodes through a relationship
    AggregateCount(&'m RelationshipField),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey<'m> {
    pub target: SortTarget<'m>,
    pub direction: SortDirection,
}

impl<'m> SortKey<'m> {
    /// Key of the helper entry carrying this sort value in a projected map.
    pub fn helper_key(&self) -> String {
        match &self.target {
            SortTarget::Field(field) => format!("__sort_{}", field.name),
            SortTarget::AggregateCount(rel) => format!("__sort_{}Aggregate_count", rel.name),
        }
    }

    /// Value to order by, evaluated against `var` bound to `entity`. Field
    /// sorts declared on an interface resolve to the member's own field.
    pub fn value(
        &self,
        ctx: &mut TranslateContext<'_>,
        entity: &Entity,
        var: &Variable,
    ) -> Result<Expr, TranslateError> {
        match &self.target {
            SortTarget::Field(field) => {
                let own = entity.field(&field.name).unwrap_or(field);
                Ok(var.property(own.db_name()))
            }
            SortTarget::AggregateCount(rel) => {
                let model = ctx.model;
                let target = model.entity(&rel.target)?;
                let (related, guard) = if target.is_concrete() {
                    (NodePattern::anonymous(&target.labels), None)
                } else {
                    let node = ctx.variable("this");
                    let guard = label_guard(model, &node, target);
                    (NodePattern::new(&node), guard)
                };
                let pattern = related_path(var, rel, None, related);
                Ok(Expr::CountSubquery(Box::new(Statement::from_clauses(vec![
                    Clause::Match(MatchClause::new(pattern).with_where(guard)),
                ]))))
            }
        }
    }
}

fn direction(value: &Value, key: &str, entity: &Entity) -> Result<SortDirection, TranslateError> {
    match value.as_str() {
        Some("ASC") => Ok(SortDirection::Asc),
        Some("DESC") => Ok(SortDirection::Desc),
        _ => Err(TranslateError::schema_mismatch_with_context(
            format!("sort `{}` expects ASC or DESC", key),
            &entity.name,
        )),
    }
}

/// Parse sort entries in request order.
pub fn parse_sort<'m>(
    entity: &'m Entity,
    sort: &[Map<String, Value>],
) -> Result<Vec<SortKey<'m>>, TranslateError> {
    let mut keys = Vec::new();
    for entry in sort {
        for (key, value) in entry {
            if let Some(field) = entity.field(key) {
                if field.is_list() {
                    return Err(TranslateError::schema_mismatch_with_context(
                        format!("cannot sort by list field `{}`", key),
                        &entity.name,
                    ));
                }
                keys.push(SortKey {
                    target: SortTarget::Field(field),
                    direction: direction(value, key, entity)?,
                });
                continue;
            }
            let relationship = key
                .strip_suffix("Aggregate")
                .and_then(|name| entity.relationship(name));
            match (relationship, value.get("count")) {
                (Some(rel), Some(dir)) if value.as_object().map(Map::len) == Some(1) => {
                    keys.push(SortKey {
                        target: SortTarget::AggregateCount(rel),
                        direction: direction(dir, key, entity)?,
                    });
                }
                _ => {
                    return Err(TranslateError::schema_mismatch_with_context(
                        format!("unknown sort key `{}`", key),
                        &entity.name,
                    ))
                }
            }
        }
    }
    Ok(keys)
}

/// ORDER BY items for keys evaluated directly on `var`. Aggregate counts are
/// computed by a preceding `CALL` returned alongside.
pub fn order_by_node(
    ctx: &mut TranslateContext<'_>,
    keys: &[SortKey<'_>],
    entity: &Entity,
    var: &Variable,
) -> Result<(Vec<Clause>, Vec<OrderByItem>), TranslateError> {
    let mut preludes = Vec::new();
    let mut items = Vec::with_capacity(keys.len());
    for key in keys {
        let expr = match &key.target {
            SortTarget::Field(_) => key.value(ctx, entity, var)?,
            SortTarget::AggregateCount(rel) => {
                let target = ctx.model.entity(&rel.target)?;
                let related = ctx.variable("this");
                let count = ctx.variable("var");
                let body = Statement::from_clauses(vec![
                    Clause::Match(
                        MatchClause::new(related_path(
                            var,
                            rel,
                            None,
                            node_pattern(&related, target),
                        ))
                        .with_where(label_guard(ctx.model, &related, target)),
                    ),
                    Clause::Return(ReturnClause::new(vec![ProjectionItem::aliased(
                        Expr::function("count", vec![related.expr()]),
                        count.name(),
                    )])),
                ]);
                preludes.push(Clause::Call(CallClause::new(
                    CallImports::Variables(vec![var.clone()]),
                    body,
                )));
                count.expr()
            }
        };
        items.push(OrderByItem {
            expr,
            direction: key.direction,
        });
    }
    Ok((preludes, items))
}

/// ORDER BY items reading the helper (or selected) keys of projected maps.
pub fn order_by_projection(keys: &[SortKey<'_>], var: &Variable, resolved: &[String]) -> Vec<OrderByItem> {
    keys.iter()
        .zip(resolved)
        .map(|(key, map_key)| OrderByItem {
            expr: var.property(map_key.clone()),
            direction: key.direction,
        })
        .collect()
}
