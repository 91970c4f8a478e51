//! `node(id:)`: decode a global id and read the one node it names.

use log::debug;

use super::context::TranslateContext;
use super::errors::TranslateError;
use super::operation::{NodeOperation, ReadOptions};
use super::read::concrete_read;
use super::shape::ResultShape;
use super::where_input::{FieldOperator, FilterExpr};
use crate::cypher_builder::Statement;
use crate::utils::GlobalId;

pub fn global_node<'m>(
    ctx: &mut TranslateContext<'m>,
    operation: &NodeOperation,
) -> Result<(Statement, ResultShape), TranslateError> {
    let resolved = GlobalId::decode(&operation.id)?.resolve(ctx.model)?;
    debug!(
        "Global id resolves to `{}`.{}",
        resolved.entity.name, resolved.field.name
    );
    let filter = FilterExpr::Field {
        field: resolved.field,
        operator: FieldOperator::Equal,
        value: resolved.value,
    };
    concrete_read(
        ctx,
        resolved.entity,
        Some(&filter),
        &ReadOptions::default(),
        &operation.selection,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph_catalog::{GraphModel, GraphModelConfig};
    use crate::translate::operation::OperationOrigin;
    use crate::translate::shape::FieldShape;
    use serde_json::json;

    fn model() -> GraphModel {
        GraphModelConfig::from_yaml_str(
            r#"
entities:
  - name: Movie
    fields:
      - { name: dbId, type: "Int!", relay_id: true }
      - { name: title, type: String }
  - name: Actor
    fields:
      - { name: name, type: String }
"#,
        )
        .unwrap()
        .build()
        .unwrap()
    }

    fn compile(id: &str) -> Result<(String, serde_json::Value, ResultShape), TranslateError> {
        let model = model();
        let config = CompilerConfig::default();
        let mut ctx = TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel)?;
        let operation: NodeOperation = serde_json::from_value(json!({
            "id": id,
            "selection": [
                "id",
                { "on": "Movie", "selection": ["title"] },
                { "on": "Actor", "selection": ["name"] }
            ]
        }))
        .unwrap();
        let (statement, shape) = global_node(&mut ctx, &operation)?;
        let query = statement.build()?;
        Ok((query.cypher, query.params["this_dbId"].clone(), shape))
    }

    #[test]
    fn test_lookup_by_global_id_keeps_matching_fragment() {
        let id = GlobalId::new("Movie", "dbId", "42").encode();
        let (text, value, shape) = compile(&id).unwrap();
        assert_eq!(
            text,
            "MATCH (this:Movie)\nWHERE this.dbId = $this_dbId\nRETURN this { id: this.dbId, .title } AS this"
        );
        assert_eq!(value, json!(42));
        let FieldShape::Object(object) = shape.root else {
            panic!("expected object shape");
        };
        assert_eq!(object.fields.len(), 2);
    }

    #[test]
    fn test_malformed_ids_rejected() {
        for id in [
            "not base64!".to_string(),
            GlobalId::new("Movie", "title", "x").encode(),
            GlobalId::new("Movie", "dbId", "forty-two").encode(),
            GlobalId::new("Missing", "dbId", "1").encode(),
        ] {
            assert!(
                matches!(compile(&id), Err(TranslateError::MalformedIdentifier(_))),
                "{}",
                id
            );
        }
    }
}
