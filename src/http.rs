use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::Value;

use balance_engine_core::{BalanceQuery, Report, ReportType};

use crate::{engine::BalanceEngine, error::EngineError};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BalanceEngine>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v2/financial-accounting/balance-engine", post(run_report))
        .route("/v2/financial-accounting/balance-engine/:report", post(run_named_report))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let status = match &error {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) | EngineError::UnsupportedReport(_) => StatusCode::NOT_FOUND,
            EngineError::MissingExchangeRate { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::DataQualityAssertion(_) | EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody {
            success: false,
            error: self.message,
        }))
            .into_response()
    }
}

async fn run_report(
    State(state): State<AppState>,
    Json(query): Json<BalanceQuery>,
) -> Result<Json<Report>, ApiError> {
    Ok(Json(state.engine.execute(&query)?))
}

/// The report type comes from the path; any `reportType` in the body is
/// overridden.
async fn run_named_report(
    State(state): State<AppState>,
    Path(report): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<Json<Report>, ApiError> {
    let report_type = ReportType::from_slug(&report).ok_or_else(|| ApiError {
        status: StatusCode::NOT_FOUND,
        message: format!("unknown report: {}", report),
    })?;

    match body.as_object_mut() {
        Some(fields) => {
            fields.insert("reportType".to_string(), Value::String(report_type.as_str().to_string()));
        }
        None => return Err(ApiError::bad_request("query must be a JSON object".to_string())),
    }

    let query: BalanceQuery =
        serde_json::from_value(body).map_err(|e| ApiError::bad_request(format!("invalid query: {}", e)))?;

    Ok(Json(state.engine.execute(&query)?))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string());
    (StatusCode::OK, [("content-type", "text/plain; charset=utf-8")], body)
}
