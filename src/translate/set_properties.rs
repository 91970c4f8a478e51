//! `SET` items for created and updated nodes and edges.

use serde_json::Value;

use super::context::TranslateContext;
use super::errors::TranslateError;
use super::mutation_input::{FieldUpdate, NodeInput, NodeUpdate, PropertyInput, UpdateOperator};
use super::predicate::operand;
use crate::cypher_builder::{Expr, Operator, SetItem, Variable};
use crate::graph_catalog::{Entity, Field, FieldGeneration, MutationKind};

/// Value computed in the database for a generated field, if the field is
/// generated on `kind`.
pub fn generated_value(field: &Field, kind: MutationKind) -> Option<Expr> {
    match &field.generation {
        FieldGeneration::Autogenerate if kind == MutationKind::Create => {
            Some(Expr::function("randomUUID", vec![]))
        }
        FieldGeneration::Timestamp { operations } if operations.contains(&kind) => field
            .scalar()
            .timestamp_function()
            .map(|name| Expr::function(name, vec![])),
        _ => None,
    }
}

/// `SET` items for fields generated in the database on `kind`.
pub fn generated_items(entity: &Entity, var: &Variable, kind: MutationKind) -> Vec<SetItem> {
    entity
        .fields
        .iter()
        .filter_map(|field| {
            generated_value(field, kind).map(|value| SetItem {
                target: var.property(field.db_name()),
                value,
            })
        })
        .collect()
}

/// Stored form of a bound value: points go through `point()`.
pub fn stored_value(ctx: &mut TranslateContext<'_>, field: &Field, raw: Expr) -> Expr {
    operand(ctx, raw, field.scalar().is_point(), field.is_list())
}

fn property_items(
    ctx: &mut TranslateContext<'_>,
    properties: &[PropertyInput<'_>],
    var: &Variable,
    param_prefix: &str,
) -> Result<Vec<SetItem>, TranslateError> {
    let mut items = Vec::with_capacity(properties.len());
    for property in properties {
        let raw = ctx.param(
            &format!("{}_{}", param_prefix, property.field.name),
            property.value.clone(),
        )?;
        items.push(SetItem {
            target: var.property(property.field.db_name()),
            value: stored_value(ctx, property.field, raw),
        });
    }
    Ok(items)
}

/// Generated values, then supplied and callback values, of a node or edge
/// being created as `var`.
pub fn create_items(
    ctx: &mut TranslateContext<'_>,
    input: &NodeInput<'_>,
    var: &Variable,
) -> Result<Vec<SetItem>, TranslateError> {
    let mut items = generated_items(input.entity, var, MutationKind::Create);
    items.extend(property_items(ctx, &input.properties, var, var.name())?);
    items.extend(property_items(ctx, &input.populated, var, var.name())?);
    Ok(items)
}

fn operator_value(
    ctx: &mut TranslateContext<'_>,
    update: &FieldUpdate<'_>,
    var: &Variable,
) -> Result<Expr, TranslateError> {
    let field = update.field;
    let current = var.property(field.db_name());
    let base = format!(
        "{}_update_{}{}",
        var.name(),
        field.name,
        update.operator.suffix()
    );
    let arithmetic = |op: Operator, raw: Expr| Expr::binary(op, current.clone(), raw);
    Ok(match update.operator {
        UpdateOperator::Set => {
            let raw = ctx.param(&base, update.value.clone())?;
            stored_value(ctx, field, raw)
        }
        UpdateOperator::Increment | UpdateOperator::Add => {
            arithmetic(Operator::Addition, ctx.param(&base, update.value.clone())?)
        }
        UpdateOperator::Decrement | UpdateOperator::Subtract => {
            arithmetic(Operator::Subtraction, ctx.param(&base, update.value.clone())?)
        }
        UpdateOperator::Multiply => {
            arithmetic(Operator::Multiplication, ctx.param(&base, update.value.clone())?)
        }
        UpdateOperator::Divide => {
            arithmetic(Operator::Division, ctx.param(&base, update.value.clone())?)
        }
        UpdateOperator::Push => {
            let value = match &update.value {
                Value::Array(_) => update.value.clone(),
                single => Value::Array(vec![single.clone()]),
            };
            let raw = ctx.param(&base, value)?;
            let pushed = operand(ctx, raw, field.scalar().is_point(), true);
            Expr::binary(Operator::Addition, current.clone(), pushed)
        }
        UpdateOperator::Pop => {
            let count = update.value.as_i64().filter(|n| *n > 0).ok_or_else(|| {
                TranslateError::SchemaMismatch(format!(
                    "`{}_POP` expects a positive integer",
                    field.name
                ))
            })?;
            // bound negated: `list[..-n]` drops the last n elements
            let raw = ctx.param(&base, Value::from(-count))?;
            Expr::ListSlice {
                list: Box::new(current.clone()),
                from: None,
                to: Some(Box::new(raw)),
            }
        }
    })
}

/// Field updates, update timestamps and callback values of `var`.
pub fn update_items(
    ctx: &mut TranslateContext<'_>,
    update: &NodeUpdate<'_>,
    var: &Variable,
) -> Result<Vec<SetItem>, TranslateError> {
    let mut items = Vec::new();
    for field_update in &update.fields {
        items.push(SetItem {
            target: var.property(field_update.field.db_name()),
            value: operator_value(ctx, field_update, var)?,
        });
    }
    if !items.is_empty() || !update.populated.is_empty() {
        items.extend(generated_items(update.entity, var, MutationKind::Update));
    }
    items.extend(property_items(
        ctx,
        &update.populated,
        var,
        &format!("{}_update", var.name()),
    )?);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::cypher_builder::{Clause, Statement};
    use crate::graph_catalog::{GraphModel, GraphModelConfig};
    use crate::translate::mutation_input::{parse_node_input, parse_node_update};
    use crate::translate::operation::OperationOrigin;
    use serde_json::json;

    fn model() -> GraphModel {
        GraphModelConfig::from_yaml_str(
            r#"
entities:
  - name: Movie
    fields:
      - { name: id, type: "ID!", autogenerate: true }
      - { name: title, type: String, alias: movieTitle }
      - { name: views, type: Int }
      - { name: tags, type: "[String]" }
      - { name: location, type: Point }
      - { name: createdAt, type: DateTime, timestamp: [CREATE] }
      - { name: updatedOn, type: Date, timestamp: [UPDATE] }
"#,
        )
        .unwrap()
        .build()
        .unwrap()
    }

    fn render(items: Vec<SetItem>) -> String {
        Statement::from_clauses(vec![Clause::Set(items)])
            .build()
            .unwrap()
            .cypher
    }

    #[test]
    fn test_create_items() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx =
            TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        let movie = model.entity("Movie").unwrap();
        let input = parse_node_input(
            &ctx,
            movie,
            &json!({ "title": "Up", "location": { "longitude": 1.0, "latitude": 2.0 } }),
            1,
        )
        .unwrap();
        let items = create_items(&mut ctx, &input, &Variable::new("this0")).unwrap();
        assert_eq!(
            render(items),
            "SET\n    this0.id = randomUUID(),\n    this0.createdAt = datetime(),\n    this0.movieTitle = $this0_title,\n    this0.location = point($this0_location)"
        );
    }

    #[test]
    fn test_update_items_with_operators() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx =
            TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        let movie = model.entity("Movie").unwrap();
        let input = json!({ "views_INCREMENT": 2, "tags_PUSH": "new", "tags_POP": 1 });
        let update = parse_node_update(&ctx, movie, input.as_object().unwrap(), 1).unwrap();
        let items = update_items(&mut ctx, &update, &Variable::new("this")).unwrap();
        let query = Statement::from_clauses(vec![Clause::Set(items)]).build().unwrap();
        assert_eq!(
            query.cypher,
            "SET\n    this.views = this.views + $this_update_views_INCREMENT,\n    this.tags = this.tags + $this_update_tags_PUSH,\n    this.tags = this.tags[..$this_update_tags_POP],\n    this.updatedOn = date()"
        );
        assert_eq!(query.params["this_update_tags_PUSH"], json!(["new"]));
        assert_eq!(query.params["this_update_tags_POP"], json!(-1));
    }

    #[test]
    fn test_pop_requires_positive_count() {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx =
            TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        let movie = model.entity("Movie").unwrap();
        let input = json!({ "tags_POP": 0 });
        let update = parse_node_update(&ctx, movie, input.as_object().unwrap(), 1).unwrap();
        assert!(update_items(&mut ctx, &update, &Variable::new("this")).is_err());
    }
}
