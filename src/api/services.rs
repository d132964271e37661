use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;

use super::{
    models::{HealthResponse, ImmediateRequest, ScheduleRequest, ScheduleResponse},
    state::AppState,
};
use crate::api::error::ApiError;
use crate::model::JobKind;

/// Schedule a maintenance job (POST /maintenance)
///
/// Validation failures (unknown group, non-positive priority) come back as
/// 400 synchronously; everything that happens after scheduling is surfaced
/// through the job record instead.
pub async fn schedule_maintenance(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduled_for = request.scheduled_for.unwrap_or_else(Utc::now);
    let kind = request.kind.unwrap_or(JobKind::Scheduled);
    let priority = request.priority.unwrap_or(1);

    let job_id = state
        .scheduler
        .schedule_maintenance(
            request.group_id,
            request.account_id,
            request.actor_id,
            scheduled_for,
            kind,
            priority,
            request.metadata,
        )
        .await?;

    let response = ScheduleResponse {
        job_id,
        scheduled_for,
    };

    Ok((axum::http::StatusCode::ACCEPTED, Json(response)))
}

/// Run an emergency maintenance pass synchronously
/// (POST /maintenance/immediate)
///
/// Returns 403 when the emergency override is disabled by configuration.
pub async fn execute_immediate(
    State(state): State<AppState>,
    Json(request): Json<ImmediateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .scheduler
        .execute_immediate(
            request.group_id,
            request.account_id,
            request.actor_id,
            request.override_conflicts,
            request.metadata,
        )
        .await?;

    Ok((axum::http::StatusCode::OK, Json(report)))
}

/// Job record endpoint (GET /maintenance/jobs/{job_id})
pub async fn get_job(
    State(state): State<AppState>,
    axum::extract::Path(job_id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .store
        .get_job(&job_id)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to load job: {e}")))?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    Ok((axum::http::StatusCode::OK, Json(job)))
}

/// Automation status endpoint (GET /maintenance/status)
pub async fn automation_status(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .scheduler
        .status()
        .await
        .map_err(|e| ApiError::Internal(format!("failed to compute status: {e}")))?;

    Ok((axum::http::StatusCode::OK, Json(status)))
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert(
        "scheduler".to_string(),
        if state.scheduler.status().await.is_ok() {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
    );

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
