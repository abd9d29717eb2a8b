//! GRN HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use shared::{CreateGrnInput, RequestSamplingInput};
use uuid::Uuid;

use crate::middleware::CurrentUser;
use crate::services::{GrnService, QualitySampleService};
use crate::AppState;

/// List GRNs, newest first
pub async fn list_grns(State(state): State<AppState>, current_user: CurrentUser) -> impl IntoResponse {
    let service = GrnService::new(state.store.clone());

    match service.list_grns(&current_user.0).await {
        Ok(grns) => (StatusCode::OK, Json(grns)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GRNs awaiting a QA sampling decision
pub async fn list_pending_grns(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> impl IntoResponse {
    let service = GrnService::new(state.store.clone());

    match service.pending_grns(&current_user.0).await {
        Ok(pending) => (StatusCode::OK, Json(pending)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a GRN
pub async fn get_grn(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let service = GrnService::new(state.store.clone());

    match service.get_grn(&current_user.0, id).await {
        Ok(grn) => (StatusCode::OK, Json(grn)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Create a GRN against a gate entry
pub async fn create_grn(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateGrnInput>,
) -> impl IntoResponse {
    let service = GrnService::new(state.store.clone());

    match service.create_grn(&current_user.0, input).await {
        Ok(grn) => (StatusCode::CREATED, Json(grn)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Raise a QC sampling request on a GRN
pub async fn request_sampling(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RequestSamplingInput>,
) -> impl IntoResponse {
    let service = QualitySampleService::new(state.store.clone(), state.config.workflow.clone());

    match service.request_sampling(&current_user.0, id, input).await {
        Ok(sample) => (StatusCode::CREATED, Json(sample)).into_response(),
        Err(e) => e.into_response(),
    }
}
