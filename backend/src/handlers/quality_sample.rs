//! Quality sample HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use shared::{AssignSampleInput, CreateTestInput};
use uuid::Uuid;

use crate::middleware::CurrentUser;
use crate::services::QualitySampleService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTestsRequest {
    pub tests: Vec<CreateTestInput>,
}

fn service(state: &AppState) -> QualitySampleService {
    QualitySampleService::new(state.store.clone(), state.config.workflow.clone())
}

/// Samples waiting for an analyst
pub async fn list_unassigned_samples(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> impl IntoResponse {
    match service(&state).unassigned_samples(&current_user.0).await {
        Ok(samples) => (StatusCode::OK, Json(samples)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Samples with an analyst that are still open
pub async fn list_assigned_samples(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> impl IntoResponse {
    match service(&state).assigned_samples(&current_user.0).await {
        Ok(samples) => (StatusCode::OK, Json(samples)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_sample(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).get_sample(&current_user.0, id).await {
        Ok(sample) => (StatusCode::OK, Json(sample)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Assign a sample to an analyst
pub async fn assign_sample(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<AssignSampleInput>,
) -> impl IntoResponse {
    match service(&state).assign_sample(&current_user.0, id, input).await {
        Ok(sample) => (StatusCode::OK, Json(sample)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list_sample_tests(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).sample_tests(&current_user.0, id).await {
        Ok(tests) => (StatusCode::OK, Json(tests)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Add ad-hoc tests to a sample
pub async fn create_sample_tests(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateTestsRequest>,
) -> impl IntoResponse {
    match service(&state).create_tests(&current_user.0, id, request.tests).await {
        Ok(tests) => (StatusCode::CREATED, Json(tests)).into_response(),
        Err(e) => e.into_response(),
    }
}
