//! HTTP surface for a `leaf_scan` detection session.
//!
//! One `DetectionSession` and one camera are shared by every request, so the
//! busy flag and the history behave exactly as they do in-process: a second
//! analyze request while one is in flight gets `409 Conflict`, and only
//! successful results show up under `/api/history`.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use leaf_scan::core_modules::camera::{CameraCapture, CameraDevice};
use leaf_scan::core_modules::catalog::DiseaseEntry;
use leaf_scan::core_modules::detection::DetectionResult;
use leaf_scan::core_modules::upload::{FileUpload, MAX_UPLOAD_BYTES_HINT, UploadedFile};
use leaf_scan::error::PipelineError;
use leaf_scan::session::DetectionSession;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info};

pub const ENV_BIND: &str = "LEAF_SCAN_BIND";
const DEFAULT_BIND: &str = "127.0.0.1:3001";
const DEFAULT_RECENT: usize = 5;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        match std::env::var(ENV_BIND) {
            Ok(bind) if !bind.is_empty() => Self { bind_addr: bind },
            _ => Self::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<DetectionSession>,
    pub camera: Arc<Mutex<CameraCapture>>,
}

impl AppState {
    pub fn new(session: DetectionSession, device: Arc<dyn CameraDevice>) -> Self {
        Self {
            session: Arc::new(session),
            camera: Arc::new(Mutex::new(CameraCapture::new(device))),
        }
    }
}

/// A result as the display renders it.
#[derive(Debug, Serialize)]
pub struct ResultView {
    #[serde(flatten)]
    pub result: DetectionResult,
    pub confidence_percent: String,
}

impl From<DetectionResult> for ResultView {
    fn from(result: DetectionResult) -> Self {
        let confidence_percent = result.confidence_percent();
        Self {
            result,
            confidence_percent,
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryView {
    latest: Option<ResultView>,
    recent: Vec<ResultView>,
    total: usize,
}

/// Upload limits shown next to the file picker.
#[derive(Debug, Serialize)]
struct LimitsView {
    max_upload_bytes_hint: u64,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    recent: Option<usize>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

fn status_for(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::AcquisitionDenied(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::UnsupportedFile(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        PipelineError::FaceDetected => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Busy | PipelineError::CameraInactive | PipelineError::Discarded => StatusCode::CONFLICT,
        PipelineError::NoSelection => StatusCode::BAD_REQUEST,
        PipelineError::Classification(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self {
            status: status_for(&e),
            message: e.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

async fn catalog(State(state): State<AppState>) -> Json<Vec<DiseaseEntry>> {
    Json(state.session.catalog().entries().to_vec())
}

async fn limits() -> Json<LimitsView> {
    Json(LimitsView {
        max_upload_bytes_hint: MAX_UPLOAD_BYTES_HINT,
    })
}

fn history_view(session: &DetectionSession, n: usize) -> HistoryView {
    let history = session.history();
    HistoryView {
        latest: history.latest().cloned().map(ResultView::from),
        recent: history.recent(n).into_iter().cloned().map(ResultView::from).collect(),
        total: history.len(),
    }
}

async fn history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Json<HistoryView> {
    Json(history_view(&state.session, query.recent.unwrap_or(DEFAULT_RECENT)))
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let media_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;

        let mut selection = FileUpload::new();
        if !selection.select(UploadedFile::new(name, media_type, bytes.to_vec())) {
            return Ok(StatusCode::NO_CONTENT.into_response());
        }
        let result = state.session.analyze_upload(&selection).await?;
        return Ok(Json(ResultView::from(result)).into_response());
    }
    Err(ApiError::bad_request("missing `file` field"))
}

async fn camera_start(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state
        .camera
        .lock()
        .await
        .start()
        .await
        .map_err(PipelineError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn camera_stop(State(state): State<AppState>) -> StatusCode {
    state.camera.lock().await.stop();
    StatusCode::NO_CONTENT
}

async fn camera_analyze(State(state): State<AppState>) -> Result<Json<ResultView>, ApiError> {
    let result = state.session.capture_and_analyze(&state.camera).await?;
    Ok(Json(ResultView::from(result)))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/catalog", get(catalog))
        .route("/api/history", get(history))
        .route("/api/limits", get(limits))
        // The size hint is advisory; uploads are not capped.
        .route("/api/upload", post(upload).layer(DefaultBodyLimit::disable()))
        .route("/api/camera/start", post(camera_start))
        .route("/api/camera/stop", post(camera_stop))
        .route("/api/camera/analyze", post(camera_analyze))
        .with_state(state)
}

/// Binds `cfg.bind_addr` and serves `state` on a background task.
pub async fn start_server(state: AppState, cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "leaf scan server listening");

    let app = router(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "server stopped");
        }
    }))
}
