//!
//! FlowBridge Server - HTTP boundary of the FlowBridge integration engine
//!
//! Publishes deployed flows as SOAP and REST endpoints and exposes the
//! deployment lifecycle over HTTP.

use std::sync::Arc;

/// API module
pub mod api;

/// Catalog loading
pub mod catalog;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Server module
pub mod server;

// Re-export key types
pub use catalog::Catalog;
pub use config::{LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::FlowBridgeServer;

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    init_logging(&config);

    let server = FlowBridgeServer::new(config)?;
    if let Some(path) = server.config.catalog_path.clone() {
        tracing::info!(%path, "Loading catalog");
        Catalog::load(&path).await?.apply(server.provider()).await?;
    }

    Arc::new(server).run().await
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = fmt().with_env_filter(filter).with_target(true);
    let result = match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    if let Err(err) = result {
        eprintln!("Logging already initialized: {}", err);
    }
}
