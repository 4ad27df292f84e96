use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use barcode_relay::{
    config::Config, create_router, logging, server, ChangeRelay, CouchChangeFeed,
};

#[derive(Parser, Debug)]
#[command(name = "barcode-relay")]
#[command(about = "Long-poll relay for barcode change events", long_about = None)]
struct Args {
    /// Config file (TOML, YAML or JSON)
    #[arg(long, env = "BARCODE_RELAY_CONFIG")]
    config: Option<String>,

    /// Listen host, overrides server.host
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides server.port
    #[arg(long)]
    port: Option<u16>,

    /// Barcodes database URL, overrides upstream.url
    #[arg(long)]
    upstream_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = args.upstream_url {
        config.upstream.url = url;
    }

    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    logging::init_logging(&config.logging)?;
    info!("Barcode relay starting...");

    let feed = CouchChangeFeed::new(&config.upstream)?;
    info!("Upstream change feed: {}", feed.changes_url());

    let relay = Arc::new(ChangeRelay::new(
        Arc::new(feed),
        config.upstream.request_timeout(),
    ));
    info!("Longpoll outer timeout: {:?}", relay.outer_timeout());

    server::serve(&config, create_router(relay)).await?;

    info!("Barcode relay shut down");
    Ok(())
}
