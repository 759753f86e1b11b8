//! Remote blob storage client.
//!
//! [`BlobStore`] is the seam between the HTTP handlers and the remote
//! container: upload a staged local file under a key, delete a blob by key.
//! The production implementation talks to Azure Blob Storage over its REST
//! API with SharedKey request signing. No retry on failure; a transport or
//! non-success response surfaces as a [`BlobError`] for the caller to report.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use sha2::Sha256;
use std::{io, path::Path};
use thiserror::Error;
use tokio::fs;

/// REST API version sent as `x-ms-version` and included in the signature.
const API_VERSION: &str = "2021-08-06";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid storage account key")]
    InvalidAccountKey,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("storage responded {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Remote blob container operations used by the handlers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload the file at `local_path` under `key`, overwriting any existing
    /// blob with that key.
    async fn put_file(&self, key: &str, local_path: &Path) -> BlobResult<()>;

    /// Delete the blob stored under `key`. Fails when the key is absent.
    async fn delete(&self, key: &str) -> BlobResult<()>;
}

/// Thin Azure Blob Storage client.
///
/// Addresses the account at `https://{account}.blob.core.windows.net` and
/// signs every request with the account key (SharedKey authorization).
pub struct AzureBlobStore {
    http: reqwest::Client,
    account: String,
    key: Vec<u8>,
    container: String,
    endpoint: String,
}

impl AzureBlobStore {
    /// Build a client for one container. The account key is expected in the
    /// base64 form the Azure portal hands out.
    pub fn new(account: &str, account_key: &str, container: &str) -> BlobResult<Self> {
        let key = general_purpose::STANDARD
            .decode(account_key)
            .map_err(|_| BlobError::InvalidAccountKey)?;

        Ok(Self {
            http: reqwest::Client::new(),
            account: account.to_string(),
            key,
            container: container.to_string(),
            endpoint: format!("https://{}.blob.core.windows.net", account),
        })
    }

    fn blob_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.container, key)
    }

    fn canonicalized_resource(&self, key: &str) -> String {
        format!("/{}/{}/{}", self.account, self.container, key)
    }

    /// Base64 HMAC-SHA256 of the string-to-sign, keyed by the account key.
    fn sign(&self, string_to_sign: &str) -> BlobResult<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|_| BlobError::InvalidAccountKey)?;
        mac.update(string_to_sign.as_bytes());
        Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn authorization(&self, string_to_sign: &str) -> BlobResult<String> {
        Ok(format!("SharedKey {}:{}", self.account, self.sign(string_to_sign)?))
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn put_file(&self, key: &str, local_path: &Path) -> BlobResult<()> {
        let bytes = fs::read(local_path).await?;
        let date = http_date();
        let headers = [
            ("x-ms-blob-type", "BlockBlob"),
            ("x-ms-date", date.as_str()),
            ("x-ms-version", API_VERSION),
        ];
        let string_to_sign = string_to_sign(
            "PUT",
            bytes.len() as u64,
            &headers,
            &self.canonicalized_resource(key),
        );
        let authorization = self.authorization(&string_to_sign)?;

        let response = self
            .http
            .put(self.blob_url(key))
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_LENGTH, bytes.len())
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .body(bytes)
            .send()
            .await?;

        // Put Blob answers 201 Created on success.
        expect_status(response, 201).await
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let date = http_date();
        let headers = [("x-ms-date", date.as_str()), ("x-ms-version", API_VERSION)];
        let string_to_sign =
            string_to_sign("DELETE", 0, &headers, &self.canonicalized_resource(key));
        let authorization = self.authorization(&string_to_sign)?;

        let response = self
            .http
            .delete(self.blob_url(key))
            .header(AUTHORIZATION, authorization)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;

        // Delete Blob answers 202 Accepted on success.
        expect_status(response, 202).await
    }
}

/// Current time in the RFC 1123 form Azure expects in `x-ms-date`.
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Assemble the SharedKey string-to-sign.
///
/// The twelve standard-header slots stay empty except Content-Length, which
/// is itself left empty for zero-length bodies. `x_ms_headers` must already
/// be sorted by header name.
fn string_to_sign(
    verb: &str,
    content_length: u64,
    x_ms_headers: &[(&str, &str)],
    canonicalized_resource: &str,
) -> String {
    let length_field = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let canonicalized_headers: String = x_ms_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    format!(
        "{verb}\n\n\n{length_field}\n\n\n\n\n\n\n\n\n{canonicalized_headers}{canonicalized_resource}"
    )
}

/// Map a non-expected status into `UnexpectedStatus`, carrying a short body
/// excerpt for the server-side log.
async fn expect_status(response: reqwest::Response, expected: u16) -> BlobResult<()> {
    let status = response.status().as_u16();
    if status == expected {
        return Ok(());
    }
    let message = match response.text().await {
        Ok(body) => body.chars().take(200).collect(),
        Err(_) => String::from("<unreadable body>"),
    };
    Err(BlobError::UnexpectedStatus { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AzureBlobStore {
        // base64 of "0123456789abcdef"
        AzureBlobStore::new("testaccount", "MDEyMzQ1Njc4OWFiY2RlZg==", "vault").unwrap()
    }

    #[test]
    fn rejects_non_base64_account_key() {
        assert!(matches!(
            AzureBlobStore::new("testaccount", "not base64!!!", "vault"),
            Err(BlobError::InvalidAccountKey)
        ));
    }

    #[test]
    fn canonicalized_resource_includes_account_container_and_key() {
        assert_eq!(
            store().canonicalized_resource("abc-123"),
            "/testaccount/vault/abc-123"
        );
    }

    #[test]
    fn blob_url_targets_the_container() {
        assert_eq!(
            store().blob_url("abc-123"),
            "https://testaccount.blob.core.windows.net/vault/abc-123"
        );
    }

    #[test]
    fn string_to_sign_has_twelve_empty_slots_around_content_length() {
        let headers = [("x-ms-date", "Mon, 01 Jan 2024 00:00:00 GMT")];
        let sts = string_to_sign("PUT", 42, &headers, "/acct/vault/key");
        assert_eq!(
            sts,
            "PUT\n\n\n42\n\n\n\n\n\n\n\n\nx-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n/acct/vault/key"
        );
    }

    #[test]
    fn zero_content_length_is_signed_as_empty() {
        let sts = string_to_sign("DELETE", 0, &[], "/acct/vault/key");
        assert!(sts.starts_with("DELETE\n\n\n\n"));
    }

    #[test]
    fn signature_is_stable_base64() {
        let store = store();
        let first = store.sign("PUT\n\ncontract").unwrap();
        let second = store.sign("PUT\n\ncontract").unwrap();
        assert_eq!(first, second);
        // HMAC-SHA256 output is 32 bytes, 44 chars in base64.
        assert_eq!(first.len(), 44);
    }

    #[test]
    fn http_date_is_rfc1123() {
        let date = http_date();
        assert!(date.ends_with(" GMT"));
        assert_eq!(date.len(), "Mon, 01 Jan 2024 00:00:00 GMT".len());
    }
}
