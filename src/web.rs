//! Axum-based HTTP surface over the charge controller

use crate::action::{ActionKind, ActionRequest};
use crate::controller::ChargeController;
use crate::error::KebaError;
use crate::station::StationId;
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ChargeController>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionBody {
    pub plugged: bool,
}

/// Error response carrying the stable error code
#[derive(Debug)]
pub struct ApiError(pub KebaError);

impl From<KebaError> for ApiError {
    fn from(err: KebaError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            KebaError::Validation { .. } | KebaError::ReservedValue { .. } => {
                StatusCode::BAD_REQUEST
            }
            KebaError::UnknownStation { .. } | KebaError::UnknownAction { .. } => {
                StatusCode::NOT_FOUND
            }
            KebaError::CooldownActive { .. }
            | KebaError::InvalidState { .. }
            | KebaError::StationExists { .. } => StatusCode::CONFLICT,
            KebaError::Transport { .. } => StatusCode::BAD_GATEWAY,
            KebaError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        });
        match &self.0 {
            KebaError::Validation { violations } => {
                body["violations"] = serde_json::to_value(violations).unwrap_or_default();
            }
            KebaError::CooldownActive { remaining_seconds } => {
                body["remaining_seconds"] = (*remaining_seconds).into();
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

fn body_error(rejection: JsonRejection) -> ApiError {
    ApiError(KebaError::validation(
        "body".to_string(),
        rejection.body_text(),
    ))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn stations(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.snapshots().await)
}

async fn station(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.controller.snapshot(&StationId::new(station)).await?;
    Ok(Json(snapshot))
}

async fn connection(
    State(state): State<AppState>,
    Path(station): Path<String>,
    body: Result<Json<ConnectionBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(body_error)?;
    let snapshot = state
        .controller
        .report_connection(&StationId::new(station), body.plugged)
        .await?;
    Ok(Json(snapshot))
}

async fn action(
    State(state): State<AppState>,
    Path(action): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    // Parse the action name first so an unknown action is a 404, not a 400
    let kind: ActionKind = action.parse()?;
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => serde_json::Value::Null,
        Err(rejection) => return Err(body_error(rejection)),
    };
    let request = ActionRequest::from_body(kind, body)?;
    let outcome = state.controller.execute(request).await?;
    Ok(Json(outcome))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/stations", get(stations))
        .route("/api/stations/{station}", get(station))
        .route("/api/stations/{station}/connection", post(connection))
        .route("/api/actions/{action}", post(action))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Socket address for `host:port`; an unparsable host binds loopback
fn bind_addr(host: &str, port: u16) -> std::result::Result<SocketAddr, SocketAddr> {
    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|_| SocketAddr::from(([127, 0, 0, 1], port)))
}

/// Serve the HTTP surface until the listener fails
pub async fn serve(controller: Arc<ChargeController>, host: &str, port: u16) -> anyhow::Result<()> {
    let logger = crate::logging::get_logger("web");
    let addr = bind_addr(host, port).unwrap_or_else(|fallback| {
        logger.warn(&format!("Invalid host '{}'; binding {}", host, fallback));
        fallback
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    logger.info(&format!(
        "HTTP surface listening on http://{}/api",
        listener.local_addr()?
    ));
    axum::serve(listener, build_router(AppState { controller })).await?;
    Ok(())
}
