//! chargekeeper-api — REST surface over the charge controller.
//!
//! This is the fixed remote command contract; local clients (CLIs, settings
//! UIs) are expected to wrap it.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/charge` | Full status: config, battery, supported flag |
//! | GET | `/api/v1/charge/supported` | Capability probe |
//! | GET | `/api/v1/charge/ceiling` | Read the ceiling |
//! | PUT | `/api/v1/charge/ceiling` | Set the ceiling (`{"value": 0..=100}`) |
//! | GET | `/api/v1/charge/floor` | Read the floor |
//! | PUT | `/api/v1/charge/floor` | Set the floor (`{"value": 0..=100}`) |
//! | GET | `/api/v1/charge/enabled` | Read the master toggle |
//! | PUT | `/api/v1/charge/enabled` | Set the master toggle (`{"value": bool}`) |
//!
//! When no charge-control hardware was detected at startup, every charge
//! operation answers 501 with an `Unsupported` error (except the status and
//! capability probes, which always succeed).

pub mod handlers;

use axum::Router;
use axum::routing::get;

use chargekeeper_controller::ControllerHandle;

/// Shared state for API handlers.
///
/// `controller` is `None` when no hardware binding exists on this device.
#[derive(Clone)]
pub struct ApiState {
    pub controller: Option<ControllerHandle>,
}

/// Build the complete API router.
pub fn build_router(controller: Option<ControllerHandle>) -> Router {
    let state = ApiState { controller };

    let charge_routes = Router::new()
        .route("/charge", get(handlers::status))
        .route("/charge/supported", get(handlers::supported))
        .route(
            "/charge/ceiling",
            get(handlers::get_ceiling).put(handlers::set_ceiling),
        )
        .route(
            "/charge/floor",
            get(handlers::get_floor).put(handlers::set_floor),
        )
        .route(
            "/charge/enabled",
            get(handlers::get_enabled).put(handlers::set_enabled),
        )
        .with_state(state);

    Router::new().nest("/api/v1", charge_routes)
}
