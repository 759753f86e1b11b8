use anyhow::{Context, Result};
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod metrics;
mod models;
mod routes;
mod services;
mod state;

use services::blob_store::{AzureBlobStore, BlobStore};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting filevault for account `{}`, container `{}`",
        cfg.storage_account,
        cfg.container
    );

    // --- Ensure local directories exist ---
    if !Path::new(&cfg.staging_dir).exists() {
        fs::create_dir_all(&cfg.staging_dir)?;
        tracing::info!("Created staging directory at {}", cfg.staging_dir);
    }
    if let Some(parent) = Path::new(&cfg.index_path).parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created index directory {:?}", parent);
        }
    }

    // --- Load the index (malformed document is fatal here) ---
    let index = services::index_store::IndexStore::load(cfg.index_path.as_str())
        .await
        .with_context(|| format!("loading index document {}", cfg.index_path))?;
    tracing::info!(
        "Loaded index from {} ({} records)",
        cfg.index_path,
        index.records().await.len()
    );

    // --- Initialize collaborators ---
    let blobs: Arc<dyn BlobStore> =
        Arc::new(AzureBlobStore::new(&cfg.storage_account, &cfg.storage_key, &cfg.container)?);
    let metrics = metrics::Metrics::new()?;

    let app_state = state::AppState {
        index,
        blobs,
        metrics,
        staging_dir: cfg.staging_dir.clone().into(),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(Path::new(&cfg.public_dir)).with_state(app_state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
