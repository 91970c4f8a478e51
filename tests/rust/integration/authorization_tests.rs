use graphcypher::{CompilerConfig, ErrorKind};
use serde_json::{json, Value};

use super::common::{assert_params_bound, compile, descriptor, translator};

fn post_read(claims: Option<Value>) -> Value {
    let mut value = json!({
        "operation": { "kind": "read", "entity": "Post", "selection": ["body"] }
    });
    if let Some(claims) = claims {
        value["claims"] = claims;
    }
    value
}

fn title_update(claims: Option<Value>) -> Value {
    let mut value = json!({
        "operation": {
            "kind": "update",
            "entity": "Movie",
            "update": { "title": "New" },
            "selection": ["title"]
        }
    });
    if let Some(claims) = claims {
        value["claims"] = claims;
    }
    value
}

#[tokio::test]
async fn test_read_filter_uses_claims() {
    let query = compile(post_read(Some(json!({ "sub": "u1" }))))
        .await
        .unwrap();
    assert_eq!(
        query.cypher,
        "MATCH (this:Post)\nWHERE ($jwt.sub IS NOT NULL AND this.owner = $jwt.sub)\nRETURN this { .body } AS this"
    );
    assert_eq!(query.params["jwt"], json!({ "sub": "u1" }));
    assert_params_bound(&query);
}

#[tokio::test]
async fn test_unauthenticated_read_matches_nothing() {
    let query = compile(post_read(None)).await.unwrap();
    assert!(query.cypher.contains("WHERE false"), "{}", query.cypher);
}

#[tokio::test]
async fn test_update_without_role_fails_every_matched_row() {
    for claims in [None, Some(json!({ "sub": "u1", "roles": ["viewer"] }))] {
        let query = compile(title_update(claims)).await.unwrap();
        assert!(
            query.cypher.starts_with(
                "MATCH (this:Movie)\nWHERE apoc.util.validatePredicate(true, \"Forbidden\", [0])\nSET"
            ),
            "{}",
            query.cypher
        );
        assert_params_bound(&query);
    }
}

#[tokio::test]
async fn test_forbidden_message_comes_from_config() {
    let config = CompilerConfig {
        forbidden_message: "Not allowed".to_string(),
        ..CompilerConfig::default()
    };
    let query = translator(config)
        .translate(&descriptor(title_update(None)))
        .await
        .unwrap();
    assert!(query
        .cypher
        .contains("apoc.util.validatePredicate(true, \"Not allowed\", [0])"));
}

#[tokio::test]
async fn test_read_with_disallowed_claim_compiles_when_nothing_matches() {
    let query = compile(json!({
        "operation": {
            "kind": "read",
            "entity": "Draft",
            "where": { "title": "does-not-exist" },
            "selection": ["title"]
        },
        "claims": { "roles": ["user"] }
    }))
    .await
    .unwrap();
    assert_eq!(
        query.cypher,
        "MATCH (this:Draft)\nWHERE (this.title = $this_title AND apoc.util.validatePredicate(true, \"Forbidden\", [0]))\nRETURN this { .title } AS this"
    );
    assert_params_bound(&query);
}

fn draft_create() -> Value {
    json!({
        "operation": {
            "kind": "create",
            "entity": "Draft",
            "input": [{ "title": "A" }, { "title": "B" }],
            "selection": ["title"]
        },
        "claims": { "sub": "u1", "roles": ["user"] }
    })
}

#[tokio::test]
async fn test_create_with_disallowed_claim_is_forbidden() {
    for batch_create in [true, false] {
        let config = CompilerConfig {
            batch_create,
            ..CompilerConfig::default()
        };
        let err = translator(config)
            .translate(&descriptor(draft_create()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ForbiddenByAuthorization, "batch_create: {}", batch_create);
        assert_eq!(err.to_string(), "Forbidden");
    }
}

#[tokio::test]
async fn test_create_with_allowed_claim_compiles() {
    let mut operation = draft_create();
    operation["claims"] = json!({ "sub": "u1", "roles": ["admin"] });
    let query = compile(operation).await.unwrap();
    assert!(!query.cypher.contains("apoc.util"), "{}", query.cypher);
}

#[tokio::test]
async fn test_disabled_authorization_skips_rules() {
    let config = CompilerConfig {
        authorization: false,
        ..CompilerConfig::default()
    };
    let translator = translator(config);
    let query = translator
        .translate(&descriptor(title_update(None)))
        .await
        .unwrap();
    assert!(!query.cypher.contains("apoc.util"));
    let read = translator
        .translate(&descriptor(post_read(None)))
        .await
        .unwrap();
    assert_eq!(read.cypher, "MATCH (this:Post)\nRETURN this { .body } AS this");
}
