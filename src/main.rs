use std::sync::Arc;

use clap::{Parser, Subcommand};
use hub_transport_operator::config::{LogFormat, OperatorConfig};
use hub_transport_operator::controller::{self, ControllerState};
use hub_transport_operator::crd::MulticlusterGlobalHub;
use hub_transport_operator::transport::ConnectionPublisher;
use hub_transport_operator::Error;
use kube::ResourceExt;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version information
    Version,
    /// Show the transport state of every hub in the namespace
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: OperatorConfig,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Operator namespace
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    namespace: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Hub Transport Operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    let api: kube::Api<MulticlusterGlobalHub> = kube::Api::namespaced(client, &args.namespace);
    let hubs = api
        .list(&Default::default())
        .await
        .map_err(Error::KubeError)?;

    println!("MulticlusterGlobalHubs: {}", hubs.items.len());
    for hub in &hubs.items {
        let mode = hub
            .status
            .as_ref()
            .and_then(|s| s.transport_mode.as_deref())
            .unwrap_or("Unset");
        println!("  {} transport={}", hub.name_any(), mode);
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    let config = args.config;
    init_tracing(config.log_format);

    info!(
        "Starting Hub Transport Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let publisher = Arc::new(ConnectionPublisher::new());
    let state = Arc::new(ControllerState::new(client, config, publisher));

    controller::run_controller(state).await
}
