//! REST API routes for the conversion service.
//!
//! Provides endpoints for document conversion, health checks, format
//! discovery, and statistics.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::error::ConvertError;
use crate::stats::MetricsCollector;
use crate::types::ConvertOptions;
use crate::validate;

/// Application state shared across handlers
pub struct AppState {
    pub coordinator: Coordinator,
    pub metrics: Arc<MetricsCollector>,
    pub version: String,
}

impl AppState {
    pub fn new(coordinator: Coordinator, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            coordinator,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Build the API router
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/convert", post(convert_document))
        .route("/health", get(health_check))
        .route("/supported-formats", get(supported_formats))
        .route("/stats", get(stats))
}

/// Service banner served at `/`
#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub service: String,
    pub version: String,
    pub health: String,
}

pub async fn root(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    let prefix = &state.coordinator.config().api_prefix;
    Json(RootResponse {
        service: "docmark".to_string(),
        version: state.version.clone(),
        health: format!("{prefix}/health"),
    })
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub workers_available: usize,
}

/// Health check endpoint. Reports 503 until the worker pool is running.
async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let workers = state.coordinator.pool().available_workers();
    let (code, status) = if workers > 0 {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: state.version.clone(),
            workers_available: workers,
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct SupportedFormatsResponse {
    pub formats: &'static [validate::SupportedFormat],
    pub count: usize,
}

/// List every format the service accepts
async fn supported_formats() -> Json<SupportedFormatsResponse> {
    let formats = validate::supported_formats();
    Json(SupportedFormatsResponse {
        formats,
        count: formats.len(),
    })
}

/// Statistics endpoint backed by the injected collector
async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Conversion response
#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub filename: String,
    pub markdown: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// Convert an uploaded document to markdown.
///
/// Accepts a multipart form with a required `file` part and optional
/// `keep_data_uris`, `file_extension`, and `mimetype` text parts.
async fn convert_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ConvertResponse>, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut options = ConvertOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Unprocessable(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Unprocessable(format!("failed to read upload: {e}")))?;
                file = Some((filename, data.to_vec()));
            }
            "keep_data_uris" => {
                let text = field.text().await.unwrap_or_default();
                options.keep_data_uris = matches!(text.trim(), "true" | "1" | "yes");
            }
            "file_extension" => {
                if let Ok(text) = field.text().await {
                    let ext = text.trim().trim_start_matches('.').to_lowercase();
                    if !ext.is_empty() {
                        options.extension = Some(format!(".{ext}"));
                    }
                }
            }
            "mimetype" => {
                if let Ok(text) = field.text().await {
                    let mime = text.trim().to_string();
                    if !mime.is_empty() {
                        options.mimetype = Some(mime);
                    }
                }
            }
            _ => {}
        }
    }

    let (filename, content) = file
        .ok_or_else(|| ApiError::Unprocessable("missing required 'file' field".to_string()))?;

    let result = state
        .coordinator
        .convert_file(content, &filename, options)
        .await?;

    Ok(Json(ConvertResponse {
        filename,
        markdown: result.markdown,
        title: result.title,
        metadata: result.metadata,
    }))
}

/// API error type
#[derive(Debug)]
pub enum ApiError {
    Convert(ConvertError),
    Unprocessable(String),
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        ApiError::Convert(err)
    }
}

/// Error body shared by every failure response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub error_type: String,
    pub status_code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type, detail) = match self {
            ApiError::Convert(err) => {
                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                // Internal failure detail stays in the logs; clients get
                // a generic message.
                let detail = match &err {
                    ConvertError::Failed(internal) => {
                        tracing::error!(error = %internal, "conversion failed");
                        "Conversion failed".to_string()
                    }
                    other => other.to_string(),
                };
                (status, err.error_type(), detail)
            }
            ApiError::Unprocessable(detail) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request", detail)
            }
        };

        (
            status,
            Json(ErrorBody {
                detail,
                error_type: error_type.to_string(),
                status_code: status.as_u16(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_shape() {
        let response: ApiError = ConvertError::Timeout(300).into();
        let response = response.into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn unsupported_type_maps_to_415() {
        let response: ApiError = ConvertError::UnsupportedType(".exe".to_string()).into();
        assert_eq!(
            response.into_response().status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[test]
    fn missing_file_maps_to_422() {
        let response = ApiError::Unprocessable("missing required 'file' field".to_string());
        assert_eq!(
            response.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn error_body_serializes_all_fields() {
        // Body fields come from the error accessors at the boundary, so
        // build them the same way here.
        let err = ConvertError::PayloadTooLarge {
            size: 200,
            limit: 100,
        };
        let body = ErrorBody {
            detail: err.to_string(),
            error_type: err.error_type().to_string(),
            status_code: err.status_code(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"error_type\":\"payload_too_large\""), "got: {json}");
        assert!(json.contains("\"status_code\":413"));
        assert!(json.contains("200"));
    }

    #[test]
    fn supported_formats_response_counts_match() {
        let formats = validate::supported_formats();
        let response = SupportedFormatsResponse {
            formats,
            count: formats.len(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"count\""));
        assert!(json.contains("pdf"));
    }
}
