use std::io::Write;
use std::sync::Arc;

use graphcypher::{CompilerConfig, GraphModelConfig, Translator};
use serde_json::json;
use tempfile::NamedTempFile;

use super::common::{descriptor, MODEL_YAML};

fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_model_and_config_from_files() {
    let model_file = temp_file(MODEL_YAML);
    let config_file = temp_file("batch_create: false\nvalidate_trailing_params: false\n");

    let model = GraphModelConfig::from_yaml_file(model_file.path())
        .unwrap()
        .build()
        .unwrap();
    let config = CompilerConfig::from_yaml_file(config_file.path()).unwrap();
    assert!(!config.batch_create);
    assert_eq!(config.forbidden_message, "Forbidden");

    let query = Translator::new(Arc::new(model), config)
        .translate(&descriptor(json!({
            "operation": {
                "kind": "update",
                "entity": "Post",
                "update": { "body": "hi" },
                "selection": ["body"]
            },
            "claims": { "sub": "u1" }
        })))
        .await
        .unwrap();
    assert!(query.cypher.starts_with("MATCH (this:Post)\nSET"));
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let config_file = temp_file("max_depth: 0\n");
    assert!(CompilerConfig::from_yaml_file(config_file.path()).is_err());
}

#[test]
fn test_model_with_dangling_target_is_rejected() {
    let model_file = temp_file(
        r#"
entities:
  - name: Movie
    relationships:
      - { name: actors, type: ACTED_IN, direction: IN, target: Actor }
"#,
    );
    let config = GraphModelConfig::from_yaml_file(model_file.path()).unwrap();
    assert!(config.build().is_err());
}
