//! API models for the maintenance scheduling and status endpoints.
//!
//! The external contract is intentionally small:
//! - `POST /maintenance` schedules a job from a [`ScheduleRequest`]
//! - `POST /maintenance/immediate` runs an emergency pass synchronously
//! - `GET /maintenance/jobs/{job_id}` returns the persisted job record
//! - `GET /maintenance/status` returns live automation gauges

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{AccountId, ActorId, GroupId, JobKind, JobMetadata};

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub group_id: GroupId,
    pub account_id: AccountId,
    pub actor_id: ActorId,
    /// Defaults to "now" when omitted.
    pub scheduled_for: Option<DateTime<Utc>>,
    pub kind: Option<JobKind>,
    pub priority: Option<u8>,
    #[serde(default)]
    pub metadata: JobMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub job_id: String,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImmediateRequest {
    pub group_id: GroupId,
    pub account_id: AccountId,
    pub actor_id: ActorId,
    #[serde(default)]
    pub override_conflicts: bool,
    #[serde(default)]
    pub metadata: JobMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
