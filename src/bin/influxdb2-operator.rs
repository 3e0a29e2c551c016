// InfluxDB 2 operator entry point, invoked once per hook
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use influxdb2_operator::charm::{influxdb2_layer, ClusterContext};
use influxdb2_operator::config::ConfigLoader;
use influxdb2_operator::framework::{dispatch, Event, StateStore};
use influxdb2_operator::k8s::{AuthContext, InClusterConnector};
use influxdb2_operator::logging::init_logging;
use influxdb2_operator::model::HookTools;
use influxdb2_operator::pebble::PebbleClient;
use influxdb2_operator::InfluxdbCharm;

#[derive(Parser)]
#[command(name = "influxdb2-operator", version, about = "InfluxDB 2 sidecar operator")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "INFLUXDB2_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle the hook the runtime dispatched
    Dispatch {
        /// Hook path, e.g. hooks/config-changed
        #[arg(env = "JUJU_DISPATCH_PATH")]
        hook: String,

        #[arg(long, env = "JUJU_RELATION_ID")]
        relation_id: Option<String>,

        /// Unit name such as influxdb2/0
        #[arg(long, env = "JUJU_UNIT_NAME")]
        unit: String,

        /// Model name, which is also the Kubernetes namespace
        #[arg(long, env = "JUJU_MODEL_NAME")]
        model: String,
    },
    /// Print the desired Pebble layer as YAML
    RenderLayer,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load_from_file(cli.config)
        .load_from_env()
        .build()
        .context("Failed to load configuration")?;

    match cli.command {
        Command::RenderLayer => {
            let layer = influxdb2_layer(&config.workload);
            print!("{}", layer.to_yaml()?);
            Ok(())
        }
        Command::Dispatch {
            hook,
            relation_id,
            unit,
            model,
        } => {
            let _guard = init_logging(&config.log)?;

            let event = Event::from_dispatch(&hook, relation_id.as_deref())?;
            let app = unit.split('/').next().unwrap_or(&unit).to_string();
            let store = StateStore::new(config.state.path.clone());

            let supervisor = PebbleClient::new(&config.pebble)?;
            let kubernetes_enabled = config.kubernetes.enabled;
            let mut charm = InfluxdbCharm::new(config, HookTools::new(), supervisor);
            if kubernetes_enabled {
                charm = charm.with_cluster(ClusterContext {
                    auth: AuthContext::new(InClusterConnector::new(model.clone())),
                    app,
                    namespace: model,
                });
            }

            let report = dispatch(&charm, &store, event).await;
            info!(
                "Dispatch finished: {:?}, {} redelivered, {} pending",
                report.outcome, report.redelivered, report.pending
            );
            Ok(())
        }
    }
}
