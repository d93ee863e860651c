mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use webmeet_core::{logging, Config};
use webmeet_sfu::{JanusClient, SignalingCoordinator};

use server::WebMeetServer;

#[derive(Parser, Debug)]
#[command(name = "webmeet")]
#[command(about = "WebMeet WebRTC signaling server", long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "WEBMEET_CONFIG_FILE")]
    config: Option<String>,

    /// Override the HTTP listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the HTTP listen port
    #[arg(long)]
    port: Option<u16>,

    /// Deployment environment; `production` forces JSON logs
    #[arg(long, env = "WEBMEET_ENV", default_value = "development")]
    env: String,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;

    if let Some(host) = &args.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.env == "production" {
        config.logging.format = "json".to_string();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = load_config(&args)?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("WebMeet signaling server starting...");
    info!("Environment: {}", args.env);
    info!("HTTP address: {}", config.http_address());

    // 4. Media relay coordinator
    let coordinator = if config.janus.enabled {
        let client = JanusClient::new(&config.janus)?;
        info!("Media relay: {} (plugin {})", client.base_url(), client.plugin());
        Some(Arc::new(SignalingCoordinator::new(Arc::new(client))))
    } else {
        info!("Media relay: disabled");
        None
    };

    // 5. Run until a shutdown signal arrives
    WebMeetServer::new(config, coordinator).start().await
}
