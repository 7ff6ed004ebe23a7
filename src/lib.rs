pub mod audit;
pub mod config;
pub mod excel;
pub mod manager;
pub mod merge;
pub mod portal;

use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use manager::Manager;
use portal::ChromePortal;

#[derive(Debug, Parser)]
#[command(name = "order-uploader", version, about)]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "order_uploader_lib=info")]
    log_level: String,
}

pub fn run() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = start(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn start(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let portal = ChromePortal::new(config.portal.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let mut manager = Manager::new(config, portal, Local::now())?;
        info!("order uploader started");
        manager.run().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
