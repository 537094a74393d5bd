use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hes_rust::config::{AppConfig, Workspace};
use hes_rust::logic::{
    build_command, GraphBuilder, JsonSchemaValidator, SchemaValidator, WorkspacePaths,
};
use hes_rust::model::{OperationId, OperationKind};

/// Build the dependency graph of a workspace and report what the server would see.
#[derive(Parser)]
#[command(name = "hes-check")]
#[command(about = "Validate a HES workspace and inspect its operations", long_about = None)]
struct Cli {
    /// Workspace root; defaults to the configured one.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Descriptor file name; defaults to the configured one.
    #[arg(long)]
    descriptor_file: Option<String>,

    /// Operation to show in detail, e.g. `/lib/reason`.
    #[arg(long)]
    operation: Option<String>,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut config = AppConfig::load()?.workspace;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(name) = cli.descriptor_file {
        config.descriptor_file = name;
    }

    let workspace = Arc::new(
        Workspace::open(&config)
            .with_context(|| format!("cannot open workspace {}", config.root.display()))?,
    );
    let validator: Arc<dyn SchemaValidator> = Arc::new(JsonSchemaValidator::new()?);
    let builder = GraphBuilder::new(
        workspace.clone(),
        validator,
        Arc::new(WorkspacePaths::new(workspace.clone())),
    );
    let graph = builder.build()?;

    match cli.operation {
        Some(value) => {
            let id = OperationId::parse(&value);
            let operation = graph
                .get(&id)
                .with_context(|| format!("no operation {} in {}", id, workspace.root().display()))?;

            let command = match &operation.kind {
                OperationKind::Inference(inference) => Some(build_command(inference)?),
                _ => None,
            };

            if cli.json {
                let report = serde_json::json!({
                    "id": id,
                    "dependencies": graph.dependencies(&id),
                    "operation": operation,
                    "command": command,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{} ({})", id, operation.tag());
                for dependency in graph.dependencies(&id) {
                    println!("  depends on {}", dependency);
                }
                println!("{}", serde_json::to_string_pretty(operation)?);
                if let Some(command) = command {
                    println!("reasoner args: {}", command);
                }
            }
        }
        None => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&graph.listing())?);
            } else {
                println!(
                    "{}: {} operations",
                    workspace.root().display(),
                    graph.len()
                );
                for id in graph.topological_order() {
                    let tag = graph.get(&id).map(|op| op.tag()).unwrap_or("?");
                    let dependencies = graph.dependencies(&id);
                    if dependencies.is_empty() {
                        println!("  {} [{}]", id, tag);
                    } else {
                        let names: Vec<String> =
                            dependencies.iter().map(ToString::to_string).collect();
                        println!("  {} [{}] <- {}", id, tag, names.join(", "));
                    }
                }
            }
        }
    }

    Ok(())
}
