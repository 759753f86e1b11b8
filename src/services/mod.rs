//! Service layer: the durable local index and the remote blob storage client.

pub mod blob_store;
pub mod index_store;
