//! HTTP handlers.
//!
//! Each OCR request runs: decode → validate → stage → recognize → read →
//! cleanup → respond. Validation happens before anything touches the disk, and
//! once a file pair is staged it is cleaned up on every path.

use crate::error::ApiError;
use crate::image;
use crate::ocr::{tsv, BboxType, BoundingBox, Recognizer};
use crate::staging::StagingArea;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::Uri,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub staging: StagingArea,
    pub recognizer: Arc<dyn Recognizer>,
}

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/get-text", post(get_text))
        .route("/api/get-bboxes", post(get_bboxes))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

// ============================================================================
// Request / response bodies
// ============================================================================

// Fields are loose JSON values so a wrong type is reported as a 400 with our
// own message rather than a deserializer rejection.
#[derive(Debug, Deserialize)]
struct TextRequest {
    base64_image: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BboxRequest {
    base64_image: Option<Value>,
    bbox_type: Option<Value>,
}

#[derive(Serialize)]
struct ApiSuccess<T> {
    success: bool,
    result: T,
}

impl<T> ApiSuccess<T> {
    fn new(result: T) -> Json<Self> {
        Json(Self {
            success: true,
            result,
        })
    }
}

#[derive(Serialize)]
struct TextResult {
    text: String,
}

#[derive(Serialize)]
struct BboxResult {
    bboxes: Vec<BoundingBox>,
    bbox_type: BboxType,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Extract plain text from an image.
async fn get_text(
    State(state): State<AppState>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<ApiSuccess<TextResult>>, ApiError> {
    let Json(req) = payload?;
    let image = require_image(req.base64_image.as_ref())?;

    let text = run_ocr(&state, &image, false, |path| async move {
        tsv::read_text(&path).await
    })
    .await?;

    info!("get-text: {} chars recognized", text.len());
    Ok(ApiSuccess::new(TextResult { text }))
}

/// Extract word boxes from an image. `bbox_type` is echoed back as-is.
async fn get_bboxes(
    State(state): State<AppState>,
    payload: Result<Json<BboxRequest>, JsonRejection>,
) -> Result<Json<ApiSuccess<BboxResult>>, ApiError> {
    let Json(req) = payload?;
    let image = require_image(req.base64_image.as_ref())?;
    let bbox_type = require_bbox_type(req.bbox_type.as_ref())?;

    let bboxes = run_ocr(&state, &image, true, |path| async move {
        tsv::read_bboxes(&path).await
    })
    .await?;

    info!("get-bboxes: {} boxes ({})", bboxes.len(), bbox_type.as_str());
    Ok(ApiSuccess::new(BboxResult { bboxes, bbox_type }))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Unhandled panic in request handler: {}", detail);
    ApiError::Unhandled.into_response()
}

// ============================================================================
// Helpers
// ============================================================================

fn require_image(value: Option<&Value>) -> Result<Vec<u8>, ApiError> {
    value
        .and_then(Value::as_str)
        .and_then(image::decode_image)
        .ok_or_else(|| ApiError::InvalidInput("Invalid base64_image".to_string()))
}

fn require_bbox_type(value: Option<&Value>) -> Result<BboxType, ApiError> {
    value.and_then(Value::as_str).and_then(BboxType::parse).ok_or_else(|| {
        let allowed: Vec<&str> = BboxType::ALL.iter().map(|t| t.as_str()).collect();
        ApiError::InvalidInput(format!(
            "Invalid bbox_type. Must be one of: {}",
            allowed.join(", ")
        ))
    })
}

/// Stage `image`, run the recognizer, then hand the output file to `read`.
/// Staged files are removed before this returns, whatever the outcome. If the
/// future is dropped or panics first, the guard removes them instead.
async fn run_ocr<T, F, Fut>(
    state: &AppState,
    image: &[u8],
    tabular: bool,
    read: F,
) -> Result<T, ApiError>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    let staged = state.staging.stage(image).await.map_err(ApiError::Staging)?;

    let result: Result<T, ApiError> = async {
        state
            .recognizer
            .recognize(&staged.image_path, &staged.output_base, tabular)
            .await?;
        debug!("{} done for {:?}", state.recognizer.name(), staged.image_path);

        let output = staged.output_file(if tabular { "tsv" } else { "txt" });
        read(output).await.map_err(ApiError::ResultRead)
    }
    .await;

    staged.cleanup().await;
    result
}
