//! relaychain - forward local ports through multi-hop proxy chains

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use relaychain::app::App;
use relaychain::config::Config;
use relaychain::error::{Error, Result};
use relaychain::metrics;
use relaychain::registry::Registry;

#[derive(Parser)]
#[command(
    name = "relaychain",
    version,
    about = "Forward local ports through multi-hop proxy chains",
    disable_version_flag = true
)]
struct Args {
    /// Print version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print an example configuration and exit
    #[arg(long)]
    gen_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.gen_config {
        let json = serde_json::to_string_pretty(&Config::example())
            .map_err(|e| Error::Config(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            eprintln!("No config file specified (use -c <file>, or --gen-config for an example)");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the config file
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| config.log.level.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("Failed to set tracing subscriber: {}", e)))?;

    metrics::init_metrics();
    info!("relaychain v{} starting...", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let app = App::from_config(&config, &Registry::with_defaults())?;
        app.run().await
    })?;

    info!("Goodbye!");
    Ok(())
}
