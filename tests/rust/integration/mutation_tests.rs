use std::sync::Arc;

use graphcypher::{CompilerConfig, ErrorKind, GraphModelConfig, Translator};
use serde_json::json;

use super::common::{assert_params_bound, compile, descriptor, translator, MODEL_YAML};

fn create_rows() -> serde_json::Value {
    json!({
        "operation": {
            "kind": "create",
            "entity": "Movie",
            "input": [{ "title": "A", "released": 1999 }, { "title": "B" }],
            "selection": ["title"]
        }
    })
}

#[tokio::test]
async fn test_per_row_create() {
    let config = CompilerConfig {
        batch_create: false,
        ..CompilerConfig::default()
    };
    let query = translator(config)
        .translate(&descriptor(create_rows()))
        .await
        .unwrap();
    assert!(query.cypher.starts_with("CALL {\n    CREATE (this0:Movie)\n    SET\n        this0.dbId = randomUUID(),\n        this0.createdAt = datetime(),\n        this0.title = $this0_title"));
    assert!(query.cypher.contains("this0.slug = $this0_slug"));
    // each row checks the singular `director` relationship before the next row starts
    assert!(query
        .cypher
        .contains("WHERE apoc.util.validatePredicate(NOT (var2 <= 1), \"Movie.director must not have more than one node\", [0])"));
    assert!(query.cypher.contains("UNWIND [this0, this3] AS this"));
    assert!(query.cypher.ends_with("RETURN collect(this { .title }) AS data"));
    assert_eq!(query.params["this0_title"], json!("A"));
    assert_eq!(query.params["this0_released"], json!(1999));
    assert_eq!(query.params["this3_title"], json!("B"));
    assert_eq!(query.params["this0_slug"], json!("movie-slug"));
    assert_eq!(query.shape.as_ref().unwrap().column, "data");
    assert_params_bound(&query);
}

#[tokio::test]
async fn test_batched_create_binds_the_same_values() {
    let query = compile(create_rows()).await.unwrap();
    assert!(query
        .cypher
        .starts_with("UNWIND $create_param0 AS create_var1\nCALL {"));
    assert!(query.cypher.contains("create_this2.title = create_var1.title"));
    assert!(query.cypher.contains("create_this2.released = create_var1.released"));
    assert_eq!(
        query.params["create_param0"],
        json!([
            { "title": "A", "released": 1999, "slug": "movie-slug" },
            { "title": "B", "slug": "movie-slug" }
        ])
    );
    assert!(query
        .cypher
        .ends_with("RETURN collect(create_this2 { .title }) AS data"));
    assert_params_bound(&query);
}

#[tokio::test]
async fn test_nested_create_runs_nested_callbacks() {
    let query = compile(json!({
        "operation": {
            "kind": "create",
            "entity": "Actor",
            "input": [{
                "name": "Keanu",
                "movies": { "create": [{ "node": { "title": "Speed" }, "edge": { "role": "Jack" } }] }
            }],
            "selection": ["name"]
        }
    }))
    .await
    .unwrap();
    let row = &query.params["create_param0"][0];
    assert_eq!(row["movies"]["create"][0]["node"]["slug"], json!("movie-slug"));
    assert_eq!(row["movies"]["create"][0]["edge"]["role"], json!("Jack"));
    assert!(query.cypher.contains(":ACTED_IN]->"));
    assert_params_bound(&query);
}

#[tokio::test]
async fn test_missing_callback_fails_the_operation() {
    let model = GraphModelConfig::from_yaml_str(MODEL_YAML)
        .unwrap()
        .build()
        .unwrap();
    let err = Translator::new(Arc::new(model), CompilerConfig::default())
        .translate(&descriptor(create_rows()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CallbackFailure);
    assert!(err.to_string().contains("slug"));
}

#[tokio::test]
async fn test_create_on_interface_is_rejected() {
    let err = compile(json!({
        "operation": {
            "kind": "create",
            "entity": "Production",
            "input": [{ "title": "A" }],
            "selection": ["title"]
        }
    }))
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
}

#[tokio::test]
async fn test_update_with_operators_and_connect() {
    let query = compile(json!({
        "operation": {
            "kind": "update",
            "entity": "Movie",
            "where": { "title": "Old" },
            "update": {
                "title": "New",
                "released_INCREMENT": 1,
                "tags_PUSH": "noir",
                "director": { "connect": { "where": { "node": { "name": "Nolan" } } } }
            },
            "selection": ["title"]
        },
        "claims": { "sub": "u1", "roles": ["editor"] }
    }))
    .await
    .unwrap();
    assert!(query
        .cypher
        .starts_with("MATCH (this:Movie)\nWHERE this.title = $this_title\nSET\n    this.title = $this_update_title,"));
    assert!(query
        .cypher
        .contains("this.released = this.released + $this_update_released_INCREMENT"));
    assert!(query.cypher.contains("this.tags = this.tags + $this_update_tags_PUSH"));
    assert!(query.cypher.contains("Movie.director must not have more than one node"));
    assert!(query.cypher.ends_with("RETURN collect(DISTINCT this { .title }) AS data"));
    assert_eq!(query.params["this_update_tags_PUSH"], json!(["noir"]));
    assert_eq!(query.params["this_update_title"], json!("New"));
    assert_params_bound(&query);
}

#[tokio::test]
async fn test_update_pop_must_be_positive() {
    let err = compile(json!({
        "operation": {
            "kind": "update",
            "entity": "Movie",
            "update": { "tags_POP": 0 },
            "selection": ["title"]
        },
        "claims": { "roles": ["editor"] }
    }))
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
}

#[tokio::test]
async fn test_delete_with_nested_delete() {
    let query = compile(json!({
        "operation": {
            "kind": "delete",
            "entity": "Movie",
            "where": { "title": "Old" },
            "delete": { "actors": { "where": { "node": { "name": "Extra" } } } }
        }
    }))
    .await
    .unwrap();
    assert_eq!(
        query.cypher,
        "MATCH (this:Movie)\nWHERE this.title = $this_title\n\
CALL {\n    WITH this\n    MATCH (this)<-[this1:ACTED_IN]-(this0:Actor)\n    WHERE this0.name = $this0_name\n    DETACH DELETE this0\n    RETURN count(*) AS var2\n}\n\
DETACH DELETE this"
    );
    assert!(query.shape.is_none());
    assert_params_bound(&query);
}
