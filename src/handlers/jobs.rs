//! # Jobs API Handlers
//!
//! Handlers for submitting, cancelling and inspecting sync jobs, plus the
//! queue status snapshot.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::DateTime;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, SyncError, validation_error};
use crate::models::job_status::ALL_JOB_STATUSES;
use crate::models::{parse_fetch_type, parse_job_status, sync_job};
use crate::queue::{JobFilter, NewJob, QueueSnapshot};
use crate::server::AppState;

/// Request body for submitting a single sync job
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    /// Dealer to fetch data for
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub dealer_id: Uuid,
    /// Fetch type to run
    #[schema(example = "work_order")]
    pub fetch_type: String,
    /// Inclusive window start (RFC 3339)
    #[schema(example = "2024-01-01T00:00:00Z")]
    pub range_from: String,
    /// Inclusive window end (RFC 3339)
    #[schema(example = "2024-01-02T00:00:00Z")]
    pub range_to: String,
    /// Optional endpoint-specific filters forwarded to the partner API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<JsonValue>,
}

/// Request body for submitting several sync jobs at once
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkCreateJobsRequest {
    /// Jobs to enqueue, validated independently
    pub jobs: Vec<CreateJobRequest>,
}

/// Outcome of one submission within a bulk request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkJobOutcome {
    /// The enqueued job when this submission was accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobInfo>,
    /// Why this submission was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response payload for the bulk submission endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkJobsResponse {
    /// Per-item outcomes in request order
    pub results: Vec<BulkJobOutcome>,
    /// Number of jobs enqueued
    pub accepted: u64,
    /// Number of submissions rejected
    pub rejected: u64,
}

/// Job information response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Unique identifier for the sync job
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Dealer this job fetches data for
    #[schema(example = "550e8400-e29b-41d4-a716-446655440001")]
    pub dealer_id: String,
    /// Fetch type this job runs
    #[schema(example = "work_order")]
    pub fetch_type: String,
    /// Current status of the job
    #[schema(example = "queued")]
    pub status: String,
    /// Inclusive window start
    #[schema(example = "2024-01-01T00:00:00+00:00")]
    pub range_from: String,
    /// Inclusive window end
    #[schema(example = "2024-01-02T00:00:00+00:00")]
    pub range_to: String,
    /// Endpoint-specific filters forwarded to the partner API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<JsonValue>,
    /// Upsert report for succeeded jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Failure reason for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Timestamp when the job was enqueued
    #[schema(example = "2024-01-15T10:30:00+00:00")]
    pub created_at: String,
    /// Timestamp when the executor claimed the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Timestamp when the job reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Response payload for the jobs listing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsResponse {
    /// Jobs matching the query, newest first
    pub jobs: Vec<JobInfo>,
}

/// Queue status snapshot response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueStatusResponse {
    /// Whether a job is currently running
    pub is_processing: bool,
    /// Number of jobs waiting in the queue
    pub queue_length: u64,
    /// The currently running job, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<JobInfo>,
    /// Queued jobs in execution order (oldest first)
    pub queued: Vec<JobInfo>,
}

impl From<sync_job::Model> for JobInfo {
    fn from(model: sync_job::Model) -> Self {
        Self {
            id: model.id.to_string(),
            dealer_id: model.dealer_id.to_string(),
            fetch_type: model.fetch_type,
            status: model.status,
            range_from: model.range_from.to_rfc3339(),
            range_to: model.range_to.to_rfc3339(),
            filters: model.filters,
            result: model.result,
            error_message: model.error_message,
            created_at: model.created_at.to_rfc3339(),
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            completed_at: model.completed_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

impl From<QueueSnapshot> for QueueStatusResponse {
    fn from(snapshot: QueueSnapshot) -> Self {
        Self {
            is_processing: snapshot.is_processing,
            queue_length: snapshot.queue_length,
            running: snapshot.running.map(JobInfo::from),
            queued: snapshot.queued.into_iter().map(JobInfo::from).collect(),
        }
    }
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Filter by job status (one of: queued, running, succeeded, failed, cancelled)
    pub status: Option<String>,
    /// Filter by dealer ID (UUID)
    pub dealer_id: Option<String>,
    /// Filter by fetch type (e.g. work_order)
    pub fetch_type: Option<String>,
    /// Maximum number of jobs to return (default: 50, max: 100)
    pub limit: Option<u32>,
}

/// Submit a single sync job
#[utoipa::path(
    post,
    path = "/jobs",
    security(("bearer_auth" = [])),
    request_body = CreateJobRequest,
    responses(
        (status = 202, description = "Job accepted and queued", body = JobInfo),
        (status = 400, description = "Invalid submission", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Dealer not found", body = ApiError),
        (status = 409, description = "Dealer is inactive", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let Json(payload) = payload?;
    let new_job = to_new_job(payload)?;
    let job = state.queue.enqueue(new_job).await?;
    Ok((StatusCode::ACCEPTED, Json(JobInfo::from(job))))
}

/// Submit several sync jobs in one request
#[utoipa::path(
    post,
    path = "/jobs/bulk",
    security(("bearer_auth" = [])),
    request_body = BulkCreateJobsRequest,
    responses(
        (status = 202, description = "Submissions processed; see per-item outcomes", body = BulkJobsResponse),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn create_jobs_bulk(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<BulkCreateJobsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BulkJobsResponse>), ApiError> {
    let Json(payload) = payload?;
    if payload.jobs.is_empty() {
        return Err(validation_error(
            "Empty bulk submission",
            serde_json::json!({ "jobs": "At least one job is required" }),
        ));
    }

    // Submissions that fail timestamp parsing are rejected up front; the rest
    // go through the queue, each validated and inserted independently.
    let mut outcomes: Vec<Option<BulkJobOutcome>> = Vec::with_capacity(payload.jobs.len());
    let mut to_enqueue = Vec::new();
    let mut slots = Vec::new();
    for (index, request) in payload.jobs.into_iter().enumerate() {
        match to_new_job(request) {
            Ok(new_job) => {
                outcomes.push(None);
                to_enqueue.push(new_job);
                slots.push(index);
            }
            Err(error) => outcomes.push(Some(BulkJobOutcome {
                job: None,
                error: Some(error.message.to_string()),
            })),
        }
    }

    let enqueued = state.queue.enqueue_many(to_enqueue).await;
    for (slot, result) in slots.into_iter().zip(enqueued) {
        outcomes[slot] = Some(match result {
            Ok(job) => BulkJobOutcome {
                job: Some(JobInfo::from(job)),
                error: None,
            },
            Err(error) => BulkJobOutcome {
                job: None,
                error: Some(error.to_string()),
            },
        });
    }

    let results: Vec<BulkJobOutcome> = outcomes.into_iter().flatten().collect();
    let accepted = results.iter().filter(|outcome| outcome.job.is_some()).count() as u64;
    let rejected = results.len() as u64 - accepted;

    Ok((
        StatusCode::ACCEPTED,
        Json(BulkJobsResponse {
            results,
            accepted,
            rejected,
        }),
    ))
}

/// Fetch a single job by ID
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Job ID (UUID)")
    ),
    responses(
        (status = 200, description = "Job details", body = JobInfo),
        (status = 400, description = "Invalid job ID", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Job not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(job_id): Path<String>,
) -> Result<Json<JobInfo>, ApiError> {
    let job_id = parse_uuid_field("id", &job_id)?;
    let job = state
        .queue
        .get(job_id)
        .await?
        .ok_or(SyncError::UnknownJob(job_id))?;
    Ok(Json(JobInfo::from(job)))
}

/// Cancel a queued job
#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Job ID (UUID)")
    ),
    responses(
        (status = 200, description = "Job cancelled", body = JobInfo),
        (status = 400, description = "Invalid job ID", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Job not found", body = ApiError),
        (status = 409, description = "Job is not queued and cannot be cancelled", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(job_id): Path<String>,
) -> Result<Json<JobInfo>, ApiError> {
    let job_id = parse_uuid_field("id", &job_id)?;
    let job = state.queue.cancel(job_id).await?;
    Ok(Json(JobInfo::from(job)))
}

/// List jobs, newest first
#[utoipa::path(
    get,
    path = "/jobs",
    security(("bearer_auth" = [])),
    params(
        ("status" = Option<String>, Query, description = "Filter by job status"),
        ("dealer_id" = Option<String>, Query, description = "Filter by dealer ID (UUID)"),
        ("fetch_type" = Option<String>, Query, description = "Filter by fetch type"),
        ("limit" = Option<u32>, Query, description = "Maximum number of jobs to return (default 50, max 100)")
    ),
    responses(
        (status = 200, description = "Jobs matching the query", body = JobsResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(params): Query<ListJobsQuery>,
) -> Result<Json<JobsResponse>, ApiError> {
    let limit = parse_limit(params.limit)?;

    let status = match &params.status {
        Some(raw) => Some(parse_job_status(raw).ok_or_else(|| {
            validation_error(
                "Invalid status",
                serde_json::json!({
                    "status": format!("Must be one of: {}", job_status_names())
                }),
            )
        })?),
        None => None,
    };

    let fetch_type = match &params.fetch_type {
        Some(raw) => Some(parse_fetch_type(raw).ok_or_else(|| {
            validation_error(
                "Invalid fetch_type",
                serde_json::json!({ "fetch_type": "Unknown fetch type" }),
            )
        })?),
        None => None,
    };

    let dealer_id = match &params.dealer_id {
        Some(raw) => Some(parse_uuid_field("dealer_id", raw)?),
        None => None,
    };

    let jobs = state
        .queue
        .list(JobFilter {
            status,
            dealer_id,
            fetch_type,
            limit: u64::from(limit),
        })
        .await?;

    Ok(Json(JobsResponse {
        jobs: jobs.into_iter().map(JobInfo::from).collect(),
    }))
}

/// Report the queue status snapshot
#[utoipa::path(
    get,
    path = "/queue/status",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current queue snapshot", body = QueueStatusResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn queue_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    let snapshot = state.queue.status().await?;
    Ok(Json(QueueStatusResponse::from(snapshot)))
}

fn to_new_job(request: CreateJobRequest) -> Result<NewJob, ApiError> {
    Ok(NewJob {
        dealer_id: request.dealer_id,
        range_from: parse_rfc3339_field("range_from", &request.range_from)?,
        range_to: parse_rfc3339_field("range_to", &request.range_to)?,
        fetch_type: request.fetch_type,
        filters: request.filters,
    })
}

fn job_status_names() -> String {
    ALL_JOB_STATUSES
        .iter()
        .map(|status| status.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_limit(limit: Option<u32>) -> Result<u32, ApiError> {
    match limit {
        Some(value) if value > 100 => Err(validation_error(
            "Invalid limit",
            serde_json::json!({ "limit": "Maximum allowed limit is 100" }),
        )),
        Some(0) => Err(validation_error(
            "Invalid limit",
            serde_json::json!({ "limit": "Minimum allowed limit is 1" }),
        )),
        Some(value) => Ok(value),
        None => Ok(50),
    }
}

fn parse_uuid_field(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| {
        validation_error(
            "Invalid identifier",
            serde_json::json!({ field: "Must be a valid UUID" }),
        )
    })
}

fn parse_rfc3339_field(field: &str, value: &str) -> Result<DateTimeWithTimeZone, ApiError> {
    DateTime::parse_from_rfc3339(value).map_err(|_| {
        validation_error(
            "Invalid timestamp",
            serde_json::json!({ field: "Must be a valid ISO 8601 timestamp (RFC 3339)" }),
        )
    })
}
