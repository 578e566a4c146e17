//! # relx-server: HTTP Service for the relx Optimizer
//!
//! This binary exposes both relx engines as a JSON service. Callers send a
//! logical plan built from catalog tables and get back the optimized plan.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   | HTTP POST /optimize or /rewrite (JSON plan)
//!   v
//! relx-server (this binary)
//!   |
//!   +-> PlanSpec -> operator tree (catalog lookups for scans)
//!   +-> Volcano search (/optimize) or HEP program (/rewrite)
//!   +-> explain text, digest and cost of the result
//!   |
//!   v
//! Client
//! ```
//!
//! ## Configuration
//!
//! - `RELX_ADDR`: listen address, `0.0.0.0:3000` by default.
//! - `RELX_CATALOG`: optional JSON file holding an `InMemoryCatalog`.
//! - `RELX_CONFIG`: optional JSON file with `search` and `hep` engine limits.
//!
//! Logging is controlled by the `RUST_LOG` environment variable (defaults to
//! `relx=debug`).

mod error;
mod plan;
mod routes;
mod state;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG adds to the default: debug output from the relx crates.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relx=debug".parse()?))
        .init();

    let config = state::ServerConfig::from_env()?;
    tracing::info!(
        "Loaded catalog with {} tables",
        config.catalog.table_names().len()
    );
    let state = Arc::new(state::AppState::new(config.catalog, config.engine));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!("relx-server listening on http://{}", config.addr);
    axum::serve(listener, app).await?;
    Ok(())
}
