use clap::Parser;
use sessionkit_core::{get_default_config_file, SessionOptions, SessionOverrides};
use sessionkit_middleware::http_server;
use sessionkit_session::InMemorySessionStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "sessionkit-demo", about = "Demo HTTP daemon with flash messages and session data")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP server address
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Session cookie name
    #[arg(short, long)]
    name: Option<String>,

    /// Session lifetime in seconds, 0 for a browser-session cookie
    #[arg(short, long)]
    lifetime: Option<u64>,

    /// Seconds between expired session sweeps, 0 to disable
    #[arg(long, default_value_t = 60)]
    cleanup_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    let args = Args::parse();

    // Load config from file or the default location
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_default_config_file("sessionkit")
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?,
    };
    let options = match SessionOptions::load_from_file(&config_path) {
        Ok(options) => {
            info!("Loaded configuration from {}", config_path.display());
            options
        }
        Err(e) => {
            error!("Failed to load configuration from {}: {}", config_path.display(), e);
            return Err(anyhow::anyhow!("Configuration error: {}", e));
        }
    };

    // Update config from CLI args
    let options = options.merge(&SessionOverrides {
        name: args.name,
        lifetime: args.lifetime,
        ..SessionOverrides::default()
    });

    info!(
        name = %options.name,
        lifetime = options.lifetime,
        "Starting sessionkit demo"
    );

    let store = Arc::new(InMemorySessionStore::new());
    if let Err(e) = http_server::run_server(
        store,
        options,
        args.addr,
        Duration::from_secs(args.cleanup_interval),
    )
    .await
    {
        error!(error = %e, "HTTP server failed");
        return Err(e);
    }

    info!("sessionkit demo shutting down");
    Ok(())
}
