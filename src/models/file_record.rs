//! Represents one uploaded file tracked by the local index.

use serde::{Deserialize, Serialize};

/// A single entry in the file index.
///
/// The record is the only durable pointer the application keeps to a blob in
/// the remote container: `key` addresses the blob, `name` is whatever the
/// uploader typed into the form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// User-supplied display name. Not guaranteed unique.
    pub name: String,

    /// Storage key of the blob in the remote container. Assigned from the
    /// staging filename at upload time, so effectively a UUID.
    pub key: String,
}
