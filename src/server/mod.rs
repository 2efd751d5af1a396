//! JSON API over the [`Resolver`].
//!
//! Handlers are thin: they translate path and query parameters into resolver calls
//! and serialize whatever comes back. The resolver already degrades upstream failures
//! into empty values, so handlers never branch on error kinds.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;

use crate::error::Result;
use crate::resolver::Resolver;

/// Shared state for the web server.
#[derive(Clone, Debug)]
pub struct AppState {
    pub resolver: Resolver,
}

impl AppState {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }
}

/// Serves the API on `addr` until Ctrl-C, then closes the shared browser.
pub async fn serve(resolver: Resolver, addr: SocketAddr) -> Result<()> {
    let app = create_router(AppState::new(resolver.clone()));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting server at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    resolver.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
