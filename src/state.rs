use crate::{
    metrics::Metrics,
    services::{blob_store::BlobStore, index_store::IndexStore},
};
use std::{path::PathBuf, sync::Arc};

/// Shared state handed to every handler.
///
/// Built once at startup; all fields are cheap clones over shared innards.
#[derive(Clone)]
pub struct AppState {
    /// Durable name→key index.
    pub index: IndexStore,

    /// Remote blob container client.
    pub blobs: Arc<dyn BlobStore>,

    /// Process-wide Prometheus collectors.
    pub metrics: Metrics,

    /// Directory where uploads are staged before forwarding.
    pub staging_dir: PathBuf,
}
