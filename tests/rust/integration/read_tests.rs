use graphcypher::utils::{offset_to_cursor, GlobalId};
use graphcypher::{ErrorKind, ResultShape};
use regex::Regex;
use serde_json::{json, Map, Value};

use super::common::{assert_params_bound, compile};

fn row(shape: &ResultShape, value: Value) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert(shape.column.clone(), value);
    row
}

#[tokio::test]
async fn test_filtered_read() {
    let query = compile(json!({
        "operation": {
            "kind": "read",
            "entity": "Movie",
            "where": { "title_STARTS_WITH": "The" },
            "selection": ["title"]
        }
    }))
    .await
    .unwrap();
    assert_eq!(
        query.cypher,
        "MATCH (this:Movie)\nWHERE this.title STARTS WITH $this_title_STARTS_WITH\nRETURN this { .title } AS this"
    );
    assert_eq!(query.params["this_title_STARTS_WITH"], json!("The"));
    assert_eq!(query.params.len(), 1);
}

#[tokio::test]
async fn test_compilation_is_deterministic() {
    let operation = json!({
        "operation": {
            "kind": "read",
            "entity": "Movie",
            "where": { "OR": [{ "title": "A" }, { "title": "B" }], "released_GT": 1990 },
            "options": { "sort": [{ "released": "DESC" }], "limit": 5 },
            "selection": [
                "title",
                { "field": "actors", "where": { "name_CONTAINS": "e" }, "selection": ["name"] },
                { "field": "actorsAggregate", "selection": { "count": true } }
            ]
        }
    });
    let first = compile(operation.clone()).await.unwrap();
    let second = compile(operation).await.unwrap();
    assert_eq!(first, second);
    assert_params_bound(&first);
}

#[tokio::test]
async fn test_nested_filters_bind_distinct_params() {
    let query = compile(json!({
        "operation": {
            "kind": "read",
            "entity": "Movie",
            "where": { "title": "A", "actors_SOME": { "name": "A" } },
            "selection": [
                { "field": "actors", "where": { "name": "A" }, "selection": ["name"] }
            ]
        }
    }))
    .await
    .unwrap();
    assert_params_bound(&query);
    let bound_a = query.params.values().filter(|v| **v == json!("A")).count();
    assert_eq!(bound_a, 3, "{:?}", query.params);
}

#[tokio::test]
async fn test_string_aggregate_filter_compares_length() {
    let query = compile(json!({
        "operation": {
            "kind": "read",
            "entity": "Movie",
            "where": { "actorsAggregate": { "node": { "name_GT": 3 } } },
            "selection": ["title"]
        }
    }))
    .await
    .unwrap();
    let length = Regex::new(r"size\(var\d+\) > \$\w+_name_GT").unwrap();
    assert!(length.is_match(&query.cypher), "{}", query.cypher);
    assert_params_bound(&query);
}

#[tokio::test]
async fn test_interface_read_keeps_branch_fields() {
    let query = compile(json!({
        "operation": {
            "kind": "read",
            "entity": "Production",
            "selection": ["title", { "on": "Series", "selection": ["episodes"] }]
        }
    }))
    .await
    .unwrap();
    assert!(query.cypher.contains("MATCH (this0:Movie)"));
    assert!(query.cypher.contains("UNION"));
    assert!(query.cypher.contains("MATCH (this1:Series)"));
    assert!(query.cypher.contains(".episodes"));

    let shape = query.shape.unwrap();
    let series = shape
        .reshape(&row(
            &shape,
            json!({ "title": "Dark", "episodes": 26, "__resolveType": "Series" }),
        ))
        .unwrap();
    assert_eq!(series, json!({ "title": "Dark", "episodes": 26 }));
    let movie = shape
        .reshape(&row(&shape, json!({ "title": "Up", "__resolveType": "Movie" })))
        .unwrap();
    assert_eq!(movie, json!({ "title": "Up" }));
}

#[tokio::test]
async fn test_global_id_round_trip() {
    let query = compile(json!({
        "operation": { "kind": "read", "entity": "Movie", "selection": ["id", "title"] }
    }))
    .await
    .unwrap();
    assert!(query.cypher.contains("id: this.dbId"));
    let shape = query.shape.unwrap();
    let shaped = shape
        .reshape(&row(&shape, json!({ "id": "m-1", "title": "Up" })))
        .unwrap();
    let token = shaped["id"].as_str().unwrap().to_string();
    assert_eq!(token, GlobalId::new("Movie", "dbId", "m-1").encode());

    let lookup = compile(json!({
        "operation": { "kind": "node", "id": token, "selection": ["title"] }
    }))
    .await
    .unwrap();
    assert_eq!(
        lookup.cypher,
        "MATCH (this:Movie)\nWHERE this.dbId = $this_dbId\nRETURN this { .title } AS this"
    );
    assert_eq!(lookup.params["this_dbId"], json!("m-1"));
}

#[tokio::test]
async fn test_node_lookup_rejects_unknown_type() {
    let token = GlobalId::new("Actor", "dbId", "1").encode();
    let err = compile(json!({
        "operation": { "kind": "node", "id": token, "selection": ["name"] }
    }))
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedIdentifier);
}

#[tokio::test]
async fn test_connection_page_after_cursor() {
    let query = compile(json!({
        "operation": {
            "kind": "connection",
            "entity": "Movie",
            "first": 2,
            "after": offset_to_cursor(1),
            "selection": {
                "totalCount": true,
                "pageInfo": ["hasNextPage", "hasPreviousPage", "endCursor"],
                "edges": { "cursor": true, "node": ["title"] }
            }
        }
    }))
    .await
    .unwrap();
    assert_params_bound(&query);
    let shape = query.shape.unwrap();
    let shaped = shape
        .reshape(&row(
            &shape,
            json!({
                "edges": [{ "node": { "title": "C" } }, { "node": { "title": "D" } }],
                "totalCount": 5
            }),
        ))
        .unwrap();
    assert_eq!(shaped["totalCount"], json!(5));
    assert_eq!(shaped["edges"][0]["cursor"], json!(offset_to_cursor(2)));
    assert_eq!(shaped["pageInfo"]["hasNextPage"], json!(true));
    assert_eq!(shaped["pageInfo"]["hasPreviousPage"], json!(true));
    assert_eq!(shaped["pageInfo"]["endCursor"], json!(offset_to_cursor(3)));
}

#[tokio::test]
async fn test_empty_connection_reshapes_to_zero() {
    let query = compile(json!({
        "operation": {
            "kind": "connection",
            "entity": "Movie",
            "selection": { "totalCount": true, "edges": { "node": ["title"] } }
        }
    }))
    .await
    .unwrap();
    let shape = query.shape.unwrap();
    let shaped = shape
        .reshape(&row(&shape, json!({ "edges": [], "totalCount": 0 })))
        .unwrap();
    assert_eq!(shaped, json!({ "totalCount": 0, "edges": [] }));
}

#[tokio::test]
async fn test_root_aggregate() {
    let query = compile(json!({
        "operation": {
            "kind": "aggregate",
            "entity": "Movie",
            "where": { "released_GTE": 2000 },
            "selection": { "count": true, "node": { "title": ["shortest"] } }
        }
    }))
    .await
    .unwrap();
    assert!(query.cypher.contains("WHERE this0.released >= $this0_released_GTE"));
    assert!(query.cypher.contains("count(this0)"));
    assert!(query.cypher.ends_with("AS this"));
    assert_params_bound(&query);
}
