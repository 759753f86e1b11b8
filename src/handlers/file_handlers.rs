//! HTTP handlers for the upload / list / delete flow.
//!
//! Uploads are staged to a local file first, then forwarded to the blob
//! container under the staging filename; the index only records the blob
//! after the remote write succeeded. Storage concerns live behind
//! `BlobStore`, index concerns behind `IndexStore`.

use crate::{errors::AppError, models::file_record::FileRecord, state::AppState};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::path::{Path as FsPath, PathBuf};
use tokio::{fs::File, io::AsyncWriteExt};
use uuid::Uuid;

/// An upload staged to the local disk, pending forwarding.
///
/// The staging filename doubles as the storage key. Dropping the guard
/// removes the file, so every exit path — success, remote failure, rejected
/// request — leaves the staging directory clean.
struct StagedFile {
    key: String,
    path: PathBuf,
}

impl StagedFile {
    fn new(staging_dir: &FsPath) -> Self {
        let key = Uuid::new_v4().to_string();
        let path = staging_dir.join(&key);
        Self { key, path }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// `POST /upload` — multipart form with a `file` part and a `note` text
/// field carrying the display name.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut note: Option<String> = None;
    let mut staged: Option<StagedFile> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Malformed multipart request: {}", err)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("note") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("Malformed multipart request: {}", err))
                })?;
                note = Some(value);
            }
            Some("file") => {
                let incoming = StagedFile::new(&state.staging_dir);
                let mut out = File::create(&incoming.path).await.map_err(|err| {
                    tracing::error!("failed to create staging file: {}", err);
                    AppError::internal("Failed to upload file.")
                })?;
                loop {
                    let chunk = field.chunk().await.map_err(|err| {
                        AppError::bad_request(format!("Malformed multipart request: {}", err))
                    })?;
                    let Some(chunk) = chunk else { break };
                    if let Err(err) = out.write_all(&chunk).await {
                        tracing::error!("failed writing staging file: {}", err);
                        return Err(AppError::internal("Failed to upload file."));
                    }
                }
                if let Err(err) = out.flush().await {
                    tracing::error!("failed flushing staging file: {}", err);
                    return Err(AppError::internal("Failed to upload file."));
                }
                staged = Some(incoming);
            }
            _ => {}
        }
    }

    let Some(note) = note.filter(|value| !value.is_empty()) else {
        return Err(AppError::bad_request("File name is required."));
    };
    let Some(staged) = staged else {
        return Err(AppError::bad_request("No file uploaded."));
    };

    let timer = state.metrics.start_storage_timer();
    let uploaded = state.blobs.put_file(&staged.key, &staged.path).await;
    timer.observe_duration();

    match uploaded {
        Ok(()) => {
            state.metrics.record_upload();
            let record = FileRecord {
                name: note,
                key: staged.key.clone(),
            };
            if let Err(err) = state.index.append(record).await {
                tracing::error!("failed to persist index after upload of {}: {}", staged.key, err);
                return Err(AppError::internal("Failed to upload file."));
            }
            Ok((StatusCode::OK, "File uploaded successfully."))
        }
        Err(err) => {
            tracing::error!("error uploading blob {}: {}", staged.key, err);
            Err(AppError::internal("Failed to upload file."))
        }
    }
}

/// `GET /files` — the full index, in insertion order.
pub async fn list_files(State(state): State<AppState>) -> Json<Vec<FileRecord>> {
    Json(state.index.records().await)
}

/// `DELETE /files/{key}` — remove the blob remotely, then drop the matching
/// index entry. A remote failure (including an already-absent key) leaves
/// the index untouched.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let timer = state.metrics.start_storage_timer();
    let deleted = state.blobs.delete(&key).await;
    timer.observe_duration();

    match deleted {
        Ok(()) => {
            if let Err(err) = state.index.remove_by_key(&key).await {
                tracing::error!("failed to persist index after delete of {}: {}", key, err);
                return Err(AppError::internal("Failed to delete file."));
            }
            Ok((StatusCode::OK, "File deleted successfully."))
        }
        Err(err) => {
            tracing::error!("error deleting blob {}: {}", key, err);
            Err(AppError::internal("Failed to delete file."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metrics::Metrics,
        routes::routes::routes,
        services::{
            blob_store::{BlobError, BlobResult, BlobStore},
            index_store::IndexStore,
        },
    };
    use async_trait::async_trait;
    use axum::{Router, body::Body, http::Request};
    use http_body_util::BodyExt;
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };
    use tower::ServiceExt;

    const BOUNDARY: &str = "filevault-test-boundary";

    /// In-memory stand-in for the remote container. Delete fails for keys
    /// that were never uploaded, mirroring the remote missing-blob error.
    #[derive(Default)]
    struct MockBlobStore {
        fail_puts: bool,
        puts: Mutex<Vec<String>>,
        blobs: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl BlobStore for MockBlobStore {
        async fn put_file(&self, key: &str, local_path: &std::path::Path) -> BlobResult<()> {
            if self.fail_puts {
                return Err(BlobError::UnexpectedStatus {
                    status: 500,
                    message: "injected failure".into(),
                });
            }
            assert!(local_path.is_file(), "staged file must exist during put");
            self.puts.lock().unwrap().push(key.to_string());
            self.blobs.lock().unwrap().insert(key.to_string());
            Ok(())
        }

        async fn delete(&self, key: &str) -> BlobResult<()> {
            if self.blobs.lock().unwrap().remove(key) {
                Ok(())
            } else {
                Err(BlobError::UnexpectedStatus {
                    status: 404,
                    message: "BlobNotFound".into(),
                })
            }
        }
    }

    struct TestApp {
        router: Router,
        blobs: Arc<MockBlobStore>,
        staging_dir: PathBuf,
        _dir: tempfile::TempDir,
    }

    async fn test_app(fail_puts: bool) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let staging_dir = dir.path().join("uploads");
        let public_dir = dir.path().join("public");
        std::fs::create_dir_all(&staging_dir).unwrap();
        std::fs::create_dir_all(&public_dir).unwrap();

        let blobs = Arc::new(MockBlobStore {
            fail_puts,
            ..MockBlobStore::default()
        });
        let state = AppState {
            index: IndexStore::load(dir.path().join("files.json")).await.unwrap(),
            blobs: blobs.clone(),
            metrics: Metrics::new().unwrap(),
            staging_dir: staging_dir.clone(),
        };
        TestApp {
            router: routes(&public_dir).with_state(state),
            blobs,
            staging_dir,
            _dir: dir,
        }
    }

    fn multipart_body(note: Option<&str>, file: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(note) = note {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\n{note}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(file) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                     filename=\"payload.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(file);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(note: Option<&str>, file: Option<&[u8]>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(note, file)))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn listed_files(router: &Router) -> Vec<FileRecord> {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/files")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn staging_is_empty(dir: &FsPath) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn upload_list_delete_roundtrip() {
        let app = test_app(false).await;

        let response = app
            .router
            .clone()
            .oneshot(upload_request(Some("report.pdf"), Some(b"%PDF-1.4 data")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "File uploaded successfully.");

        let files = listed_files(&app.router).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "report.pdf");
        assert_eq!(files[0].key, app.blobs.puts.lock().unwrap()[0]);
        assert!(
            staging_is_empty(&app.staging_dir),
            "staged file must be cleaned up after a successful upload"
        );

        let key = files[0].key.clone();
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/files/{key}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "File deleted successfully.");

        assert!(listed_files(&app.router).await.is_empty());
    }

    #[tokio::test]
    async fn upload_without_note_is_rejected() {
        let app = test_app(false).await;

        let response = app
            .router
            .clone()
            .oneshot(upload_request(None, Some(b"data")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "File name is required.");

        assert!(app.blobs.puts.lock().unwrap().is_empty());
        assert!(listed_files(&app.router).await.is_empty());
        assert!(staging_is_empty(&app.staging_dir));
    }

    #[tokio::test]
    async fn upload_with_empty_note_is_rejected() {
        let app = test_app(false).await;

        let response = app
            .router
            .clone()
            .oneshot(upload_request(Some(""), Some(b"data")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.blobs.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected() {
        let app = test_app(false).await;

        let response = app
            .router
            .clone()
            .oneshot(upload_request(Some("report.pdf"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "No file uploaded.");
        assert!(listed_files(&app.router).await.is_empty());
    }

    #[tokio::test]
    async fn failed_remote_upload_reports_500_and_cleans_staging() {
        let app = test_app(true).await;

        let response = app
            .router
            .clone()
            .oneshot(upload_request(Some("report.pdf"), Some(b"data")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Failed to upload file.");

        assert!(listed_files(&app.router).await.is_empty());
        assert!(
            staging_is_empty(&app.staging_dir),
            "staged file must be cleaned up after a failed upload"
        );
    }

    #[tokio::test]
    async fn deleting_absent_key_fails_without_touching_index() {
        let app = test_app(false).await;

        app.router
            .clone()
            .oneshot(upload_request(Some("keep.txt"), Some(b"data")))
            .await
            .unwrap();
        let files = listed_files(&app.router).await;
        assert_eq!(files.len(), 1);

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/files/no-such-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Failed to delete file.");
        assert_eq!(listed_files(&app.router).await, files);
    }

    #[tokio::test]
    async fn repeated_delete_of_same_key_stays_failed() {
        let app = test_app(false).await;

        app.router
            .clone()
            .oneshot(upload_request(Some("once.txt"), Some(b"data")))
            .await
            .unwrap();
        let key = listed_files(&app.router).await[0].key.clone();

        let delete = |uri: String| {
            app.router.clone().oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
        };

        let first = delete(format!("/files/{key}")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = delete(format!("/files/{key}")).await.unwrap();
        assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(listed_files(&app.router).await.is_empty());
    }

    #[tokio::test]
    async fn metrics_count_successful_uploads() {
        let app = test_app(false).await;

        app.router
            .clone()
            .oneshot(upload_request(Some("report.pdf"), Some(b"data")))
            .await
            .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        assert!(text.contains("filevault_uploads_total 1"));
        assert!(text.contains("filevault_storage_duration_seconds_count 1"));
    }
}
