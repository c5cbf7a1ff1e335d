//! Environmental sensor station agent - main entry point

use clap::{Parser, Subcommand};
use envstation::agent::StationAgent;
use envstation::auth::{IdentityClaims, TokenSigner};
use envstation::config::StationConfig;
use envstation::observability::init_default_logging;
use envstation::protocol::topics::bridge_client_id;
use envstation::transport::mqtt::{ConnectionDescriptor, ConnectionState, MqttClient};
use std::path::PathBuf;
use std::process;
use tokio::{
    signal,
    time::{sleep, Duration},
};
use tracing::{error, info};

/// Environmental sensor station agent for Cloud IoT MQTT bridges
#[derive(Parser)]
#[command(name = "envstation")]
#[command(about = "Simulated environmental sensor station publishing telemetry over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the station agent
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Station agent v{} activated", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Station agent shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<StationConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(StationConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["station.toml", "config/station.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(StationConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Please provide one with -c/--config or create station.toml"
            );
            process::exit(1);
        }
    }
}

async fn run_agent(config: StationConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting station agent for device: {}", config.device.id);

    let mut agent = build_agent(&config)?;

    agent.start().await?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Station agent is running; publishing telemetry and listening for config/commands...");

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
        _ = monitor_connection(&agent) => {
            error!("Broker connection lost, shutting down agent...");
        }
    }

    agent.shutdown().await?;
    Ok(())
}

/// Build the agent: mint the device token, assemble the connection descriptor
/// and inject the MQTT transport.
fn build_agent(config: &StationConfig) -> Result<StationAgent<MqttClient>, Box<dyn std::error::Error>> {
    let signer = TokenSigner::from_pem_file(&config.auth.private_key_path, &config.auth.algorithm)?;
    let claims = IdentityClaims::new(&config.device.project, config.auth.token_ttl_secs);
    let token = signer.sign(&claims)?;
    info!(
        "Minted device token, valid until {} (epoch seconds)",
        claims.exp
    );

    let client_id = bridge_client_id(
        &config.device.project,
        &config.device.region,
        &config.device.registry,
        &config.device.id,
    );
    let descriptor = ConnectionDescriptor::new(config.mqtt.broker_url.clone(), client_id, token);
    let transport = MqttClient::new(descriptor)?;

    Ok(StationAgent::new(config, transport))
}

fn handle_config_command(
    config: StationConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current station configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolve when the MQTT session reports Disconnected.
///
/// The session does not reconnect on its own; once the link drops the process
/// exits and must be restarted with a fresh token.
async fn monitor_connection(agent: &StationAgent<MqttClient>) {
    let transport = agent.transport();
    loop {
        {
            let transport = transport.lock().await;
            if matches!(
                transport.connection_state(),
                Some(ConnectionState::Disconnected(_))
            ) {
                break;
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
}
