use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use graphcypher::{config::CompilerConfig, GraphModelConfig, OperationDescriptor, Translator};
use log::info;
use serde_json::json;

/// graphcypher - compile a graph operation to Neo4j Cypher
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML graph model
    #[arg(long)]
    model: PathBuf,

    /// Operation descriptor as JSON, `-` reads it from stdin
    #[arg(long)]
    operation: String,

    /// YAML compiler configuration; GRAPHCYPHER_* variables are used otherwise
    #[arg(long)]
    config: Option<PathBuf>,
}

fn read_operation(source: &str) -> anyhow::Result<OperationDescriptor> {
    let text = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("reading operation from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("reading operation file {}", source))?
    };
    serde_json::from_str(&text).context("parsing operation descriptor")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CompilerConfig::from_yaml_file(path)?,
        None => CompilerConfig::from_env()?,
    };
    let model = GraphModelConfig::from_yaml_file(&cli.model)?.build()?;
    info!(
        "Loaded model with {} entities from {}",
        model.entities().count(),
        cli.model.display()
    );

    let descriptor = read_operation(&cli.operation)?;
    let translator = Translator::new(Arc::new(model), config);
    let query = translator.translate(&descriptor).await?;

    let output = json!({ "cypher": query.cypher, "params": query.params });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
