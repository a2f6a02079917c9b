//! Diagram, version and optimization routes.
//!
//! Handlers only translate between HTTP and the diagram service. Every
//! failure leaves as an [`ApiError`] with a `{ code, message, retryable }`
//! body; storage internals and raw generator payloads are logged, never
//! returned.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use tracing::{error, warn};

use crate::error::ErrorBody;
use crate::services::diagram::{self, Candidate, DiagramInput};
use crate::services::optimize::{OptimizationError, OptimizationResult};
use crate::services::store::{Diagram, DiagramChanges, DiagramId, DiagramVersion, NewDiagram, StoreError};
use crate::state::AppState;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// Malformed path parameter or request body.
    BadRequest(String),
    Store(StoreError),
    Optimization(OptimizationError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<OptimizationError> for ApiError {
    fn from(err: OptimizationError) -> Self {
        Self::Optimization(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

pub(crate) fn store_error_to_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::DiagramNotFound(_) | StoreError::VersionNotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn optimization_error_to_status(err: &OptimizationError) -> StatusCode {
    match err {
        OptimizationError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        OptimizationError::EmptyInput => StatusCode::BAD_REQUEST,
        OptimizationError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        OptimizationError::Unavailable(_)
        | OptimizationError::MalformedResponse(_)
        | OptimizationError::InvalidMarkup(_)
        | OptimizationError::NoSuggestions => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody { code: "E_VALIDATION".into(), message: message.clone(), retryable: false },
            ),
            Self::Store(err @ StoreError::Database(e)) => {
                error!(error = %e, "storage failure");
                (store_error_to_status(err), ErrorBody::masked(err, "storage failure"))
            }
            Self::Store(err) => (store_error_to_status(err), ErrorBody::from_error(err)),
            Self::Optimization(err @ OptimizationError::Unavailable(e)) => {
                warn!(error = %e, "optimization service call failed");
                (optimization_error_to_status(err), ErrorBody::masked(err, "optimization service unavailable"))
            }
            Self::Optimization(err) => (optimization_error_to_status(err), ErrorBody::from_error(err)),
        };
        (status, Json(body)).into_response()
    }
}

fn parse_id(raw: &str) -> Result<DiagramId, ApiError> {
    raw.parse::<DiagramId>()
        .map_err(|_| ApiError::BadRequest(format!("invalid diagram id: {raw}")))
}

fn parse_version(raw: &str) -> Result<i32, ApiError> {
    raw.parse::<i32>()
        .map_err(|_| ApiError::BadRequest(format!("invalid version number: {raw}")))
}

// =============================================================================
// BODIES
// =============================================================================

#[derive(Deserialize)]
pub struct UpdateDiagramBody {
    #[serde(flatten)]
    pub changes: DiagramChanges,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Deserialize)]
pub struct OptimizeBody {
    pub markup: String,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /api/diagrams`: all diagrams, most recently updated first.
pub async fn list_diagrams(State(state): State<AppState>) -> Result<Json<Vec<Diagram>>, ApiError> {
    Ok(Json(state.store.list_diagrams().await?))
}

/// `POST /api/diagrams`: create a diagram and its version 1.
pub async fn create_diagram(
    State(state): State<AppState>,
    body: Result<Json<NewDiagram>, JsonRejection>,
) -> Result<(StatusCode, Json<Diagram>), ApiError> {
    let Json(new) = body?;
    let created = diagram::save_diagram(state.store.as_ref(), DiagramInput::Draft(new), None).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/diagrams/:id`
pub async fn get_diagram(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Diagram>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.get_diagram(id).await?))
}

/// `PUT /api/diagrams/:id`: save a new version.
pub async fn update_diagram(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateDiagramBody>, JsonRejection>,
) -> Result<Json<Diagram>, ApiError> {
    let id = parse_id(&id)?;
    let Json(body) = body?;
    let input = DiagramInput::Persisted { id, changes: body.changes };
    Ok(Json(diagram::save_diagram(state.store.as_ref(), input, body.comment).await?))
}

/// `DELETE /api/diagrams/:id`: idempotent; deleting a missing diagram succeeds.
pub async fn delete_diagram(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    state.store.delete_diagram(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// `GET /api/diagrams/:id/versions`: newest first.
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DiagramVersion>>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.list_versions(id).await?))
}

/// `GET /api/diagrams/:id/versions/:version`
pub async fn get_version(
    State(state): State<AppState>,
    Path((id, version)): Path<(String, String)>,
) -> Result<Json<DiagramVersion>, ApiError> {
    let id = parse_id(&id)?;
    let version = parse_version(&version)?;
    Ok(Json(state.store.get_version(id, version).await?))
}

/// `POST /api/diagrams/:id/optimize`: unsaved candidate for a stored diagram.
pub async fn optimize_diagram(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Candidate>, ApiError> {
    let id = parse_id(&id)?;
    let optimizer = state.optimizer.as_deref().ok_or(OptimizationError::NotConfigured)?;
    let source = state.store.get_diagram(id).await?;
    Ok(Json(diagram::request_optimization(optimizer, &source).await?))
}

/// `POST /api/optimize`: optimize raw markup without touching the store.
pub async fn optimize_markup(
    State(state): State<AppState>,
    body: Result<Json<OptimizeBody>, JsonRejection>,
) -> Result<Json<OptimizationResult>, ApiError> {
    let Json(body) = body?;
    let optimizer = state.optimizer.as_deref().ok_or(OptimizationError::NotConfigured)?;
    Ok(Json(optimizer.optimize(&body.markup).await?))
}

#[cfg(test)]
#[path = "diagrams_test.rs"]
mod tests;
