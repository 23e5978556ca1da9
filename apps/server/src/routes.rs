//! HTTP routes.

use std::io;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chunkvault_protocol::{
    ChunkRecord, CompleteUploadRequest, CompleteUploadResponse, FileRecord, HealthResponse,
    InitUploadRequest,
};
use chunkvault_transfer::{TransferError, parse_file_id};
use futures_util::{StreamExt, stream};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Room for multipart framing and text fields on top of the largest chunk.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Buffer between the assembler and the response body.
const STREAM_BUFFER: usize = 256 * 1024;

const FALLBACK_MIME: &str = "application/octet-stream";

pub fn router(state: AppState) -> Router {
    let chunk_limit = usize::try_from(state.service.config().max_chunk_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/init", post(init_upload))
        .route(
            "/upload",
            post(upload_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/complete", post(complete_upload))
        .route("/files", get(list_files))
        .route("/download/{file_id}", get(download))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

async fn init_upload(
    State(state): State<AppState>,
    payload: Result<Json<InitUploadRequest>, JsonRejection>,
) -> Result<Json<FileRecord>, ApiError> {
    let Json(req) = payload?;
    let record = state
        .service
        .init_upload(&req.name, req.size, &req.mime_type)
        .await?;
    Ok(Json(record))
}

/// Fields of one `/upload` form.
#[derive(Default)]
struct UploadForm {
    file_id: Option<String>,
    sequence: Option<String>,
    destination: Option<String>,
    data: Option<Bytes>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match name.as_str() {
                "file_id" | "upload_id" => form.file_id = Some(field.text().await?),
                "sequence" => form.sequence = Some(field.text().await?),
                "destination" => form.destination = Some(field.text().await?),
                "file" => form.data = Some(field.bytes().await?),
                _ => {}
            }
        }
        Ok(form)
    }
}

async fn upload_chunk(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ChunkRecord>, ApiError> {
    let form = UploadForm::read(multipart).await?;

    let raw_id = form
        .file_id
        .ok_or_else(|| ApiError::bad_request("missing field: file_id"))?;
    let file_id = parse_file_id(&raw_id)?;

    let raw_seq = form
        .sequence
        .ok_or_else(|| ApiError::bad_request("missing field: sequence"))?;
    let sequence: u32 = raw_seq
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid sequence: {raw_seq}")))?;

    let destination = match form.destination.as_deref().map(str::trim) {
        None | Some("") => state.destination,
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::bad_request(format!("invalid destination: {raw}")))?,
    };

    let data = form
        .data
        .ok_or_else(|| ApiError::bad_request("missing field: file"))?;

    let chunk = state
        .service
        .upload_chunk(file_id, sequence, data, destination)
        .await?;
    Ok(Json(chunk))
}

async fn complete_upload(
    State(state): State<AppState>,
    payload: Result<Json<CompleteUploadRequest>, JsonRejection>,
) -> Result<Json<CompleteUploadResponse>, ApiError> {
    let Json(req) = payload?;
    let file_id = parse_file_id(&req.file_id)?;
    state.service.complete_upload(file_id).await?;
    Ok(Json(CompleteUploadResponse::completed(file_id)))
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileRecord>>, ApiError> {
    Ok(Json(state.service.list_files().await?))
}

/// Streams the reassembled file.
///
/// Status and headers are sent before the first chunk arrives, so a failure
/// during assembly can only abort the body. The stream then ends with an
/// error instead of a clean EOF.
async fn download(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let file_id = parse_file_id(&raw_id)?;
    let record = state.service.get_metadata(file_id).await?;
    if !record.is_completed() {
        return Err(TransferError::NotCompleted(file_id).into());
    }

    let (mut writer, reader) = tokio::io::duplex(STREAM_BUFFER);
    let (done_tx, done_rx) = oneshot::channel::<Result<(), String>>();

    let service = state.service.clone();
    tokio::spawn(async move {
        let result = service.assemble(file_id, &mut writer).await;
        // Closing the writer ends the reader before the outcome is checked.
        drop(writer);
        let outcome = result.map(|_| ()).map_err(|e| {
            warn!(file_id = %file_id, error = %e, "download aborted");
            e.to_string()
        });
        let _ = done_tx.send(outcome);
    });

    let tail = stream::once(done_rx).filter_map(|outcome| async move {
        match outcome {
            Ok(Ok(())) => None,
            Ok(Err(message)) => Some(Err(io::Error::other(message))),
            Err(_) => Some(Err(io::Error::other("assembly task ended unexpectedly"))),
        }
    });
    let body = Body::from_stream(ReaderStream::new(reader).chain(tail));

    info!(file_id = %file_id, name = %record.name, size = record.size, "download started");

    let mime = if record.mime_type.is_empty() {
        FALLBACK_MIME
    } else {
        record.mime_type.as_str()
    };
    let content_type =
        HeaderValue::from_str(mime).unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_MIME));

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(&record.name))
        .body(body)
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        })
}

/// `attachment; filename="<name>"`, with characters a header value cannot
/// carry replaced by `_`.
fn content_disposition(name: &str) -> HeaderValue {
    let safe: String = name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

// ---------------------------------------------------------------------------
// Health checks
// ---------------------------------------------------------------------------

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

/// The router is built only after the account pool and metadata store, and
/// an empty pool fails at startup, so a serving process is ready.
async fn readyz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ready".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::Request;
    use chunkvault_bot_pool::{AccountPool, BotAccount, MemoryBackend};
    use chunkvault_metadata::{MemoryStore, MetadataStore};
    use chunkvault_protocol::FileId;
    use chunkvault_transfer::{FileService, TransferConfig};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const DEST: i64 = -100_500;
    const BOUNDARY: &str = "chunkvault-test-boundary";

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        backend: MemoryBackend,
    }

    fn test_app() -> TestApp {
        let backend = MemoryBackend::new();
        let accounts: Vec<Arc<dyn BotAccount>> = ["bot_a", "bot_b"]
            .iter()
            .map(|id| Arc::new(backend.account(id)) as Arc<dyn BotAccount>)
            .collect();
        let store = Arc::new(MemoryStore::new());
        let service = FileService::new(
            Arc::new(AccountPool::from_accounts(accounts)),
            store.clone() as Arc<dyn MetadataStore>,
            TransferConfig::default(),
        );
        TestApp {
            router: router(AppState::new(Arc::new(service), DEST)),
            store,
            backend,
        }
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_request(fields: &[(&str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            if *name == "file" {
                body.extend_from_slice(
                    b"Content-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\n\
                      Content-Type: application/octet-stream\r\n\r\n",
                );
            } else {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
            body.extend_from_slice(value);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Bytes) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    async fn send_json(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(router, req).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn init(router: &Router, name: &str, size: i64) -> String {
        let (status, body) = send_json(
            router,
            json_request(
                "/init",
                json!({"name": name, "size": size, "mime_type": "text/plain"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoints() {
        let app = test_app();
        let (status, body) =
            send_json(&app.router, Request::get("/healthz").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (_, body) =
            send_json(&app.router, Request::get("/readyz").body(Body::empty()).unwrap()).await;
        assert_eq!(body, json!({"status": "ready"}));
    }

    #[tokio::test]
    async fn upload_and_download_over_http() {
        let app = test_app();
        let id = init(&app.router, "greeting.txt", 11).await;

        // Out of order, second one uses the upload_id alias.
        let (status, chunk) = send_json(
            &app.router,
            multipart_request(&[
                ("file_id", id.as_bytes()),
                ("sequence", b"1"),
                ("file", b" world"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(chunk["sequence"], 1);
        assert_eq!(chunk["size"], 6);

        let (status, _) = send_json(
            &app.router,
            multipart_request(&[
                ("upload_id", id.as_bytes()),
                ("sequence", b"0"),
                ("file", b"hello"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send_json(&app.router, json_request("/complete", json!({"upload_id": id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");

        let (status, files) =
            send_json(&app.router, Request::get("/files").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(files.as_array().unwrap().len(), 1);
        assert_eq!(files[0]["name"], "greeting.txt");
        assert_eq!(files[0]["status"], "completed");

        let resp = app
            .router
            .clone()
            .oneshot(
                Request::get(format!("/download/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"greeting.txt\""
        );
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello world");

        // Chunks went to the default destination.
        let (dest, caption) = app
            .backend
            .message_for(&format!("chunk_{id}_0"))
            .unwrap();
        assert_eq!(dest, DEST);
        assert_eq!(caption, format!("ID: {id}\nPart: 0"));
    }

    #[tokio::test]
    async fn upload_honours_explicit_destination() {
        let app = test_app();
        let id = init(&app.router, "a.bin", 3).await;
        let (status, _) = send_json(
            &app.router,
            multipart_request(&[
                ("file_id", id.as_bytes()),
                ("sequence", b"0"),
                ("destination", b"-42"),
                ("file", b"abc"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (dest, _) = app.backend.message_for(&format!("chunk_{id}_0")).unwrap();
        assert_eq!(dest, -42);
    }

    #[tokio::test]
    async fn init_validation_errors() {
        let app = test_app();
        let (status, body) =
            send_json(&app.router, json_request("/init", json!({"name": "a", "size": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let too_big = 1001_i64 * 50 * 1024 * 1024;
        let (status, _) = send_json(
            &app.router,
            json_request("/init", json!({"name": "a", "size": too_big})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.store.len().await, 0);

        let (status, body) =
            send_json(&app.router, json_request("/init", json!({"size": 10}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn upload_form_errors() {
        let app = test_app();
        let id = init(&app.router, "a.bin", 3).await;

        let (status, body) = send_json(
            &app.router,
            multipart_request(&[("file_id", id.as_bytes()), ("sequence", b"0")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing field: file");

        let (status, _) = send_json(
            &app.router,
            multipart_request(&[
                ("file_id", id.as_bytes()),
                ("sequence", b"first"),
                ("file", b"abc"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send_json(
            &app.router,
            multipart_request(&[
                ("file_id", b"nope"),
                ("sequence", b"0"),
                ("file", b"abc"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("bad id format"));

        let unknown = FileId::new().to_string();
        let (status, _) = send_json(
            &app.router,
            multipart_request(&[
                ("file_id", unknown.as_bytes()),
                ("sequence", b"0"),
                ("file", b"abc"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(app.backend.send_count(), 0);
    }

    #[tokio::test]
    async fn complete_and_download_status_codes() {
        let app = test_app();
        let unknown = FileId::new().to_string();

        let (status, _) = send_json(
            &app.router,
            json_request("/complete", json!({"file_id": unknown})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send_json(
            &app.router,
            Request::get(format!("/download/{unknown}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send_json(
            &app.router,
            Request::get("/download/not-an-id")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Pending files cannot be downloaded.
        let id = init(&app.router, "a.bin", 3).await;
        let (status, _) = send_json(
            &app.router,
            Request::get(format!("/download/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn failed_assembly_aborts_body() {
        let app = test_app();
        let mut record = FileRecord::new_pending("lost.bin", 3, "");
        record.chunks.push(ChunkRecord {
            sequence: 0,
            message_id: 1,
            blob_id: "mem-bot_a-404".into(),
            owner: "bot_a".into(),
            size: 3,
        });
        let id = record.id;
        app.store.insert(record).await.unwrap();
        app.store.mark_completed(id).await.unwrap();

        let resp = app
            .router
            .clone()
            .oneshot(
                Request::get(format!("/download/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], FALLBACK_MIME);
        assert!(resp.into_body().collect().await.is_err());
    }

    #[test]
    fn disposition_sanitizes_name() {
        assert_eq!(
            content_disposition("my file.txt"),
            "attachment; filename=\"my file.txt\""
        );
        assert_eq!(
            content_disposition("a\"b\nc.txt"),
            "attachment; filename=\"a_b_c.txt\""
        );
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename=\"r_sum_.pdf\""
        );
    }
}
