//! HTTP service for fontflow
//!
//! Thin axum layer over [`FontLibrary`]. Every font route is scoped to the
//! caller named in the `x-user-id` header, which the upstream auth layer sets.
//! Font work is synchronous, so handlers push it onto the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State};
use axum::http::header::{self, HeaderName};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task;
use uuid::Uuid;

use fontflow_core::{
    font_face_css, FontLibrary, FsStore, JsonRepository, ObjectStore, PipelineError, StorageError,
};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const USER_HEADER: &str = "x-user-id";
const UPLOAD_FIELD: &str = "font";
const SKIPPED_HEADER: HeaderName = HeaderName::from_static("x-fontflow-skipped");

/// Everything `fontflow serve` needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub data_dir: PathBuf,
    pub public_url: String,
    pub signing_secret: String,
    pub url_ttl: Duration,
    pub max_upload_bytes: usize,
}

/// Shared handler state.
///
/// The filesystem store is kept twice: behind the library as a trait object,
/// and concretely so `/objects` can check signatures and content types.
#[derive(Clone)]
pub struct AppState {
    library: Arc<FontLibrary>,
    store: Arc<FsStore>,
}

impl AppState {
    /// Open the object directory and record file under `config.data_dir`.
    pub fn open(config: &ServerConfig) -> Result<Self> {
        let objects = config.data_dir.join("objects");
        let store = Arc::new(
            FsStore::open(&objects, config.public_url.as_str(), &config.signing_secret)
                .with_context(|| format!("opening object store at {}", objects.display()))?,
        );
        let records = config.data_dir.join("fonts.json");
        let repository = Arc::new(
            JsonRepository::open(&records)
                .with_context(|| format!("opening records at {}", records.display()))?,
        );
        let library =
            FontLibrary::new(store.clone(), repository).with_url_ttl(config.url_ttl);

        Ok(Self {
            library: Arc::new(library),
            store,
        })
    }
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let state = AppState::open(&config)?;
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding HTTP server to {}", config.bind))?;

    log::info!(
        "serving on {} (data in {}, links via {})",
        config.bind,
        config.data_dir.display(),
        config.public_url
    );
    axum::serve(listener, router(state, config.max_upload_bytes))
        .await
        .context("serving HTTP")?;
    Ok(())
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/fonts",
            post(upload_handler)
                .layer(DefaultBodyLimit::max(max_upload_bytes))
                .get(list_handler),
        )
        .route("/fonts/css", post(css_handler))
        .route("/fonts/{id}", delete(delete_handler))
        .route("/objects/{key}", get(object_handler))
        .with_state(state)
}

/// Caller identity taken from the `x-user-id` header.
#[derive(Debug, Clone)]
pub struct Owner(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Owner(value.to_string()))
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "missing user identity",
                    "unauthorized",
                )
            })
    }
}

/// JSON `{error, reason}` error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    reason: &'static str,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, reason: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            reason,
        }
    }

    fn internal(context: &str, err: impl std::fmt::Debug) -> Self {
        log::error!("{context}: {err:?}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error",
            "internal_error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message, "reason": self.reason }));
        (self.status, body).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::NoFileProvided | PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound => StatusCode::NOT_FOUND,
            PipelineError::Forbidden => StatusCode::FORBIDDEN,
            PipelineError::Storage(_) | PipelineError::Persistence(_) => {
                log::error!("{err}: {err:?}");
                return Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error",
                    err.reason(),
                );
            }
        };
        Self::new(status, err.to_string(), err.reason())
    }
}

/// Run blocking font work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::internal("task join error", err))?
}

async fn upload_handler(
    Owner(owner): Owner,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let library = state.library.clone();
    let outcome = blocking(move || {
        let (filename, data) = match &upload {
            Some((name, data)) => (name.as_str(), Some(data.as_slice())),
            None => ("", None),
        };
        library
            .upload(&owner, filename, data)
            .map_err(ApiError::from)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    let reason = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        "upload_too_large"
    } else {
        "invalid_upload"
    };
    ApiError::new(err.status(), err.body_text(), reason)
}

async fn list_handler(
    Owner(owner): Owner,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let library = state.library.clone();
    let fonts = blocking(move || library.list(&owner).map_err(ApiError::from)).await?;
    Ok(Json(fonts))
}

#[derive(Debug, Serialize)]
struct Deleted {
    message: &'static str,
    id: Uuid,
}

async fn delete_handler(
    Owner(owner): Owner,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::from(PipelineError::NotFound))?;
    let library = state.library.clone();
    let font = blocking(move || library.delete(&owner, id).map_err(ApiError::from)).await?;
    Ok(Json(Deleted {
        message: "font deleted",
        id: font.id,
    }))
}

#[derive(Debug, Deserialize)]
struct CssRequest {
    ids: Vec<Uuid>,
    #[serde(default)]
    weights: Option<Vec<u16>>,
}

async fn css_handler(
    Owner(owner): Owner,
    State(state): State<AppState>,
    request: Result<Json<CssRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request.map_err(|rejection| {
        ApiError::new(rejection.status(), rejection.body_text(), "invalid_request")
    })?;

    let library = state.library.clone();
    let output = blocking(move || {
        let fonts = library
            .fonts_for_css(&owner, &request.ids)
            .map_err(ApiError::from)?;
        Ok(font_face_css(&fonts, request.weights.as_deref(), |key| {
            library.object_url(key)
        }))
    })
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/css; charset=utf-8".to_string()),
            (SKIPPED_HEADER, output.skipped.len().to_string()),
        ],
        output.css,
    ))
}

#[derive(Debug, Deserialize)]
struct ObjectQuery {
    expires: Option<i64>,
    signature: Option<String>,
}

async fn object_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ObjectQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(expires), Some(signature)) = (query.expires, query.signature.as_deref()) else {
        return Err(link_rejected());
    };
    if !state
        .store
        .verify_signature(&key, expires, signature, Utc::now().timestamp())
    {
        return Err(link_rejected());
    }

    let store = state.store.clone();
    let (content_type, bytes) = blocking(move || {
        let bytes = store.get(&key).map_err(object_error)?;
        let content_type = store.content_type(&key).map_err(object_error)?;
        Ok((content_type, bytes))
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

fn link_rejected() -> ApiError {
    ApiError::new(
        StatusCode::FORBIDDEN,
        "link is invalid or expired",
        "forbidden",
    )
}

fn object_error(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound(_) | StorageError::InvalidKey(_) => {
            ApiError::new(StatusCode::NOT_FOUND, "object not found", "not_found")
        }
        other => ApiError::internal("reading object", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use fontflow_core::fixtures;
    use http_body_util::BodyExt;
    use std::fs;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "fontflow-test-boundary";
    const PUBLIC_URL: &str = "http://fonts.test";

    struct Harness {
        dir: TempDir,
        app: Router,
    }

    fn harness_with_limit(max_upload_bytes: usize) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ServerConfig {
            bind: "127.0.0.1:0".into(),
            data_dir: dir.path().to_path_buf(),
            public_url: PUBLIC_URL.into(),
            signing_secret: "test-secret".into(),
            url_ttl: Duration::from_secs(600),
            max_upload_bytes,
        };
        let state = AppState::open(&config).expect("state");
        Harness {
            dir,
            app: router(state, max_upload_bytes),
        }
    }

    fn harness() -> Harness {
        harness_with_limit(DEFAULT_MAX_UPLOAD_BYTES)
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(user: Option<&str>, field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let mut builder = Request::post("/fonts").header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder
            .body(Body::from(multipart_body(field, filename, data)))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = send(app, request).await;
        let value = serde_json::from_slice(&body).expect("json body");
        (status, value)
    }

    async fn upload_fixture(app: &Router, user: &str) -> serde_json::Value {
        let font = fixtures::truetype_font("Server Sans", "Bold", 700);
        let (status, body) =
            send_json(app, upload_request(Some(user), "font", "Server Sans.ttf", &font)).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    fn stored_objects(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path().join("objects"))
            .expect("objects dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let h = harness();
        let request = Request::get("/health").body(Body::empty()).unwrap();

        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn upload_returns_created_record() {
        let h = harness();
        let body = upload_fixture(&h.app, "alice").await;

        let font = &body["font"];
        assert_eq!(font["owner"], "alice");
        assert_eq!(font["family"], "Server Sans");
        assert_eq!(font["weight"], 700);
        assert_eq!(font["format"], "ttf");
        assert!(font["woff2File"].as_str().unwrap().ends_with(".woff2"));
        assert!(body["warning"].is_null());

        let objects = stored_objects(&h.dir);
        assert_eq!(objects.len(), 2, "{objects:?}");
        assert!(objects.iter().any(|o| o.ends_with("-Server-Sans.ttf")));
    }

    #[tokio::test]
    async fn png_upload_is_rejected_without_writes() {
        let h = harness();
        let (status, body) = send_json(
            &h.app,
            upload_request(Some("alice"), "font", "photo.png", &fixtures::png_bytes()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "unsupported_format");
        assert!(stored_objects(&h.dir).is_empty());
        assert!(!h.dir.path().join("fonts.json").exists());
    }

    #[tokio::test]
    async fn upload_without_font_field_is_rejected() {
        let h = harness();
        let font = fixtures::truetype_font("Server Sans", "Regular", 400);
        let (status, body) =
            send_json(&h.app, upload_request(Some("alice"), "avatar", "a.ttf", &font)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "no_file_provided");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let h = harness_with_limit(256);
        let font = fixtures::truetype_font("Server Sans", "Regular", 400);
        let (status, _) = send(&h.app, upload_request(Some("alice"), "font", "a.ttf", &font)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(stored_objects(&h.dir).is_empty());
    }

    #[tokio::test]
    async fn requests_without_identity_are_unauthorized() {
        let h = harness();
        let font = fixtures::truetype_font("Server Sans", "Regular", 400);

        let (status, body) = send_json(&h.app, upload_request(None, "font", "a.ttf", &font)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["reason"], "unauthorized");

        let request = Request::get("/fonts")
            .header(USER_HEADER, "   ")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner_with_working_preview_links() {
        let h = harness();
        upload_fixture(&h.app, "alice").await;

        let request = Request::get("/fonts")
            .header(USER_HEADER, "bob")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send_json(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let request = Request::get("/fonts")
            .header(USER_HEADER, "alice")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send_json(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        let fonts = body.as_array().expect("array");
        assert_eq!(fonts.len(), 1);

        let preview = fonts[0]["previewUrl"].as_str().expect("preview url");
        let path = preview.strip_prefix(PUBLIC_URL).expect("public base");
        let response = h
            .app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "font/ttf");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(
            bytes.as_ref(),
            fixtures::truetype_font("Server Sans", "Bold", 700).as_slice()
        );
    }

    #[tokio::test]
    async fn object_links_require_a_valid_signature() {
        let h = harness();
        let body = upload_fixture(&h.app, "alice").await;
        let key = body["font"]["originalFile"].as_str().unwrap().to_string();

        let unsigned = Request::get(format!("/objects/{key}")).body(Body::empty()).unwrap();
        let (status, body) = send_json(&h.app, unsigned).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["reason"], "forbidden");

        let forged = Request::get(format!(
            "/objects/{key}?expires={}&signature={}",
            Utc::now().timestamp() + 60,
            "0".repeat(64)
        ))
        .body(Body::empty())
        .unwrap();
        let (status, _) = send(&h.app, forged).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn delete_enforces_ownership() {
        let h = harness();
        let body = upload_fixture(&h.app, "alice").await;
        let id = body["font"]["id"].as_str().unwrap().to_string();

        let as_user = |user: &str| {
            Request::delete(format!("/fonts/{id}"))
                .header(USER_HEADER, user)
                .body(Body::empty())
                .unwrap()
        };

        let (status, body) = send_json(&h.app, as_user("bob")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["reason"], "forbidden");
        assert_eq!(stored_objects(&h.dir).len(), 2);

        let (status, body) = send_json(&h.app, as_user("alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());
        assert!(stored_objects(&h.dir).is_empty());

        let (status, body) = send_json(&h.app, as_user("alice")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["reason"], "not_found");
    }

    #[tokio::test]
    async fn delete_with_malformed_id_is_not_found() {
        let h = harness();
        let request = Request::delete("/fonts/not-a-uuid")
            .header(USER_HEADER, "alice")
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn css_endpoint_renders_owned_fonts() {
        let h = harness();
        let body = upload_fixture(&h.app, "alice").await;
        let id = body["font"]["id"].as_str().unwrap().to_string();
        let stranger = Uuid::new_v4();

        let request = Request::post("/fonts/css")
            .header(USER_HEADER, "alice")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "ids": [id, stranger], "weights": [400, 700] }).to_string(),
            ))
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/css"));
        assert_eq!(response.headers()[&SKIPPED_HEADER], "0");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let css = String::from_utf8(body.to_vec()).expect("utf8");
        assert_eq!(css.matches("@font-face").count(), 2);
        assert!(css.contains("font-family: \"Server Sans Bold\";"));
        assert!(css.contains(&format!("url(\"{PUBLIC_URL}/objects/")));
        assert!(css.contains("format(\"woff2\")"));
    }

    #[tokio::test]
    async fn css_endpoint_rejects_malformed_json() {
        let h = harness();
        let request = Request::post("/fonts/css")
            .header(USER_HEADER, "alice")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"ids": "nope"}"#))
            .unwrap();

        let (status, body) = send_json(&h.app, request).await;
        assert!(status.is_client_error());
        assert_eq!(body["reason"], "invalid_request");
    }
}
