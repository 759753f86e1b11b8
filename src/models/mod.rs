//! Core data model for the file vault service.
//!
//! A single entity links a user-facing display name to the storage key of a
//! blob in the remote container. It serializes naturally as JSON via `serde`,
//! both for the `/files` endpoint and for the on-disk index document.

pub mod file_record;
