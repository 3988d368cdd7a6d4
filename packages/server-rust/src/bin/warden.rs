//! warden - run one management operation against a configuration model
//!
//! Loads the model, installs a deployment-unit service per deployment,
//! executes the operation through the controller pipeline and prints the
//! response as JSON.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower::ServiceExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_core::{ModelNode, Operation};
use warden_server::runtime::install_deployment_units;
use warden_server::{
    build_operation_pipeline, standard_handlers, ControllerConfig, ModelController, ServiceRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Execute a management operation against a configuration model")]
struct Cli {
    /// Operation JSON file, or `-` for stdin
    operation: PathBuf,

    /// Initial configuration model JSON file
    #[arg(long, env = "WARDEN_MODEL")]
    model: Option<PathBuf>,

    /// Only update the model, skip runtime service transitions
    #[arg(long)]
    model_only: bool,

    /// Identifier of this node in logs
    #[arg(long, env = "WARDEN_NODE_ID", default_value = "standalone")]
    node_id: String,

    /// Maximum number of concurrently admitted operations
    #[arg(long, default_value = "64")]
    max_concurrent_operations: u32,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the resulting model after the response
    #[arg(long)]
    print_model: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warden=info,warden_server=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn read_json(path: &PathBuf) -> anyhow::Result<serde_json::Value> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading operation from stdin")?;
        text
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = ControllerConfig {
        node_id: cli.node_id,
        max_concurrent_operations: cli.max_concurrent_operations,
        runtime_effects: !cli.model_only,
    };

    let model = match &cli.model {
        Some(path) => ModelNode::from(read_json(path)?),
        None => ModelNode::empty_object(),
    };
    let operation = Operation::from_node(&ModelNode::from(read_json(&cli.operation)?))
        .context("decoding operation")?;

    let services = Arc::new(ServiceRegistry::new());
    if config.runtime_effects {
        let installed = install_deployment_units(&services, &model).await?;
        info!(installed, "deployment units installed");
    }

    let controller = ModelController::with_config(
        &config,
        model,
        Arc::new(standard_handlers()),
        services.clone(),
    );
    let pipeline = build_operation_pipeline(controller.clone(), &config);
    let response = pipeline.oneshot(operation).await?;

    println!("{}", serde_json::to_string_pretty(&response.to_node().to_json())?);
    if cli.print_model {
        println!(
            "{}",
            serde_json::to_string_pretty(&controller.read_model().await.to_json())?
        );
    }

    services.shutdown_all().await;
    Ok(())
}
