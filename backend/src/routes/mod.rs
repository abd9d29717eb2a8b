//! Route definitions for the material QMS API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - gate log
        .nest("/gate-entries", gate_entry_routes(state))
        // Protected routes - goods receipt
        .nest("/grns", grn_routes(state))
        // Protected routes - QC samples
        .nest("/samples", sample_routes(state))
        // Protected routes - test state machine and worklists
        .nest("/quality-tests", quality_test_routes(state))
        // Protected routes - inbox
        .nest("/notifications", notification_routes(state))
        .nest("/tasks", task_routes(state))
}

fn gate_entry_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_gate_entries).post(handlers::create_gate_entry),
        )
        .route("/:id", get(handlers::get_gate_entry))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn grn_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_grns).post(handlers::create_grn))
        .route("/pending", get(handlers::list_pending_grns))
        .route("/:id", get(handlers::get_grn))
        .route("/:id/sampling", post(handlers::request_sampling))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn sample_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/unassigned", get(handlers::list_unassigned_samples))
        .route("/assigned", get(handlers::list_assigned_samples))
        .route("/:id", get(handlers::get_sample))
        .route("/:id/assign", post(handlers::assign_sample))
        .route(
            "/:id/tests",
            get(handlers::list_sample_tests).post(handlers::create_sample_tests),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn quality_test_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/review", get(handlers::list_tests_for_review))
        .route("/warehouse", get(handlers::list_warehouse_decisions))
        .route("/mine", get(handlers::list_my_tests))
        .route("/:id", get(handlers::get_test))
        .route("/:id/assign", post(handlers::assign_test))
        .route("/:id/start", post(handlers::start_test))
        .route("/:id/reopen", post(handlers::reopen_test))
        .route("/:id/submit", post(handlers::submit_result))
        .route("/:id/review", post(handlers::review_test))
        .route("/:id/qa-officer", post(handlers::assign_qa_officer))
        .route("/:id/recommendation", post(handlers::submit_recommendation))
        .route("/:id/decision", post(handlers::record_decision))
        .route("/:id/warehouse-action", post(handlers::record_warehouse_action))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn notification_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/unread-count", get(handlers::get_unread_count))
        .route("/:id/read", post(handlers::mark_notification_read))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn task_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_tasks))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}
