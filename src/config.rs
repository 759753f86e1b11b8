use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub index_path: String,
    pub staging_dir: String,
    pub public_dir: String,
    pub storage_account: String,
    pub storage_key: String,
    pub container: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "FileVault — file upload service backed by Azure Blob Storage")]
pub struct Args {
    /// Host to bind to (overrides FILEVAULT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILEVAULT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Path of the JSON index document (overrides FILEVAULT_INDEX_PATH)
    #[arg(long)]
    pub index_path: Option<String>,

    /// Directory where uploads are staged before forwarding (overrides FILEVAULT_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<String>,

    /// Directory of static assets to serve (overrides FILEVAULT_PUBLIC_DIR)
    #[arg(long)]
    pub public_dir: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    ///
    /// Storage credentials are environment-only; a missing account name, key,
    /// or container name is a fatal startup error.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("FILEVAULT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("FILEVAULT_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILEVAULT_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading FILEVAULT_PORT"),
        };
        let env_index =
            env::var("FILEVAULT_INDEX_PATH").unwrap_or_else(|_| "./data/files.json".into());
        let env_staging =
            env::var("FILEVAULT_STAGING_DIR").unwrap_or_else(|_| "./data/uploads".into());
        let env_public = env::var("FILEVAULT_PUBLIC_DIR").unwrap_or_else(|_| "./public".into());

        let storage_account = env::var("AZURE_STORAGE_ACCOUNT_NAME")
            .context("reading AZURE_STORAGE_ACCOUNT_NAME")?;
        let storage_key =
            env::var("AZURE_STORAGE_ACCOUNT_KEY").context("reading AZURE_STORAGE_ACCOUNT_KEY")?;
        let container = env::var("AZURE_CONTAINER_NAME").context("reading AZURE_CONTAINER_NAME")?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            index_path: args.index_path.unwrap_or(env_index),
            staging_dir: args.staging_dir.unwrap_or(env_staging),
            public_dir: args.public_dir.unwrap_or(env_public),
            storage_account,
            storage_key,
            container,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
