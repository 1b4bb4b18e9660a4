//! REST API handlers.
//!
//! Each handler goes through the `ControllerHandle`: reads are watch
//! snapshots, writes are queued commands acked after they are applied.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use chargekeeper_core::{BatterySnapshot, ChargeConfig, ChargeError};
use chargekeeper_controller::ControllerHandle;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn charge_error_response(err: ChargeError) -> axum::response::Response {
    let status = match err {
        ChargeError::OutOfRange(_) => StatusCode::BAD_REQUEST,
        ChargeError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChargeError::Unsupported => StatusCode::NOT_IMPLEMENTED,
    };
    error_response(&err.to_string(), status)
}

/// Resolve the controller or answer `Unsupported`.
fn require_controller(state: &ApiState) -> Result<&ControllerHandle, axum::response::Response> {
    state
        .controller
        .as_ref()
        .ok_or_else(|| charge_error_response(ChargeError::Unsupported))
}

/// Body for the integer setters.
#[derive(serde::Deserialize)]
pub struct LevelRequest {
    pub value: i64,
}

/// Body for the toggle setter.
#[derive(serde::Deserialize)]
pub struct ToggleRequest {
    pub value: bool,
}

/// Full charge status.
#[derive(serde::Serialize)]
pub struct ChargeStatus {
    pub supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ChargeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatterySnapshot>,
}

// ── Status & capability ────────────────────────────────────────

/// GET /api/v1/charge
pub async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    let status = match &state.controller {
        Some(handle) => ChargeStatus {
            supported: true,
            config: Some(handle.config()),
            battery: Some(handle.battery()),
        },
        None => ChargeStatus {
            supported: false,
            config: None,
            battery: None,
        },
    };
    ApiResponse::ok(status)
}

/// GET /api/v1/charge/supported
pub async fn supported(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.is_some())
}

// ── Reads ──────────────────────────────────────────────────────

/// GET /api/v1/charge/ceiling
pub async fn get_ceiling(State(state): State<ApiState>) -> impl IntoResponse {
    match require_controller(&state) {
        Ok(handle) => ApiResponse::ok(handle.ceiling()).into_response(),
        Err(resp) => resp,
    }
}

/// GET /api/v1/charge/floor
pub async fn get_floor(State(state): State<ApiState>) -> impl IntoResponse {
    match require_controller(&state) {
        Ok(handle) => ApiResponse::ok(handle.floor()).into_response(),
        Err(resp) => resp,
    }
}

/// GET /api/v1/charge/enabled
pub async fn get_enabled(State(state): State<ApiState>) -> impl IntoResponse {
    match require_controller(&state) {
        Ok(handle) => ApiResponse::ok(handle.enabled()).into_response(),
        Err(resp) => resp,
    }
}

// ── Writes ─────────────────────────────────────────────────────

/// PUT /api/v1/charge/ceiling
pub async fn set_ceiling(
    State(state): State<ApiState>,
    Json(req): Json<LevelRequest>,
) -> impl IntoResponse {
    let handle = match require_controller(&state) {
        Ok(handle) => handle,
        Err(resp) => return resp,
    };
    match handle.set_ceiling(req.value).await {
        Ok(()) => ApiResponse::ok(req.value).into_response(),
        Err(e) => charge_error_response(e),
    }
}

/// PUT /api/v1/charge/floor
pub async fn set_floor(
    State(state): State<ApiState>,
    Json(req): Json<LevelRequest>,
) -> impl IntoResponse {
    let handle = match require_controller(&state) {
        Ok(handle) => handle,
        Err(resp) => return resp,
    };
    match handle.set_floor(req.value).await {
        Ok(()) => ApiResponse::ok(req.value).into_response(),
        Err(e) => charge_error_response(e),
    }
}

/// PUT /api/v1/charge/enabled
pub async fn set_enabled(
    State(state): State<ApiState>,
    Json(req): Json<ToggleRequest>,
) -> impl IntoResponse {
    let handle = match require_controller(&state) {
        Ok(handle) => handle,
        Err(resp) => return resp,
    };
    match handle.set_enabled(req.value).await {
        Ok(()) => ApiResponse::ok(req.value).into_response(),
        Err(e) => charge_error_response(e),
    }
}
