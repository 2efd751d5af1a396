//! Shiori API server.
//!
//! Reads `SHIORI_*` settings from the environment (and `.env`), binds `SHIORI_BIND`
//! (default `127.0.0.1:8080`) and serves the JSON API until Ctrl-C.

use std::net::SocketAddr;

use shiori::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> shiori::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shiori=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind = std::env::var("SHIORI_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| Error::Other(format!("invalid SHIORI_BIND {:?}: {}", bind, e)))?;

    let config = Config::from_env();
    tracing::info!(
        environment = ?config.browser.environment,
        shared_browser = config.browser.shared,
        "configuration loaded"
    );

    shiori::server::serve(Resolver::from_config(&config), addr).await
}
