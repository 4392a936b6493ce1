use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use folio::config::{Config, StoreKind};
use folio::{Server, Services, app};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to config file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[clap(short, long)]
    bind: Option<SocketAddr>,

    /// Use the in-process store instead of MongoDB. Data is lost on exit.
    #[clap(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        debug!("loaded environment from {}", path.display());
    }

    let args = Cli::parse();

    let mut config = if let Some(path) = args.config {
        debug!("loading config from {:?}", path);
        Config::load(path).await?
    } else {
        debug!("using default config");
        Config::default()
    };
    config.apply_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.in_memory {
        config.store.kind = StoreKind::Memory;
    }

    let store = config.open_store().await?;
    let services = Services::init(store, &config.store.collections).await?;
    info!(kind = ?config.store.kind, database = %config.store.database, "store opened");

    let result = Server::bind(config.bind_addr)
        .serve(app(services.clone(), &config)?)
        .await;

    services.close().await;
    result?;
    Ok(())
}
