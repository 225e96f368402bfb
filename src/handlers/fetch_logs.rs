//! # Fetch Log API Handlers
//!
//! Read-only listing over the fetch audit trail, newest first, with opaque
//! cursor pagination.

use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{ApiError, validation_error};
use crate::models::job_status::ALL_JOB_STATUSES;
use crate::models::{fetch_log, parse_fetch_type, parse_job_status};
use crate::repositories::FetchLogRepository;
use crate::repositories::fetch_log::FetchLogFilter;
use crate::server::AppState;

/// One row of the fetch audit trail
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchLogInfo {
    /// Unique identifier for the log row
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Sync job this fetch ran for
    #[schema(example = "550e8400-e29b-41d4-a716-446655440001")]
    pub job_id: String,
    /// Dealer the data was fetched for
    #[schema(example = "550e8400-e29b-41d4-a716-446655440002")]
    pub dealer_id: String,
    /// Fetch type that ran
    #[schema(example = "work_order")]
    pub fetch_type: String,
    /// Outcome of the fetch
    #[schema(example = "succeeded")]
    pub status: String,
    /// Number of records returned by the partner API
    #[schema(example = 42)]
    pub records_fetched: i32,
    /// Failure reason for failed fetches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Wall-clock duration of the fetch in milliseconds
    #[schema(example = 1250)]
    pub duration_ms: i64,
    /// Timestamp when the fetch started
    #[schema(example = "2024-01-15T10:30:00+00:00")]
    pub started_at: String,
    /// Timestamp when the fetch finished
    #[schema(example = "2024-01-15T10:30:01+00:00")]
    pub finished_at: String,
    /// Timestamp when the row was written
    #[schema(example = "2024-01-15T10:30:01+00:00")]
    pub created_at: String,
}

impl From<fetch_log::Model> for FetchLogInfo {
    fn from(model: fetch_log::Model) -> Self {
        Self {
            id: model.id.to_string(),
            job_id: model.job_id.to_string(),
            dealer_id: model.dealer_id.to_string(),
            fetch_type: model.fetch_type,
            status: model.status,
            records_fetched: model.records_fetched,
            error_message: model.error_message,
            duration_ms: model.duration_ms,
            started_at: model.started_at.to_rfc3339(),
            finished_at: model.finished_at.to_rfc3339(),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Response payload for the fetch log listing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchLogsResponse {
    /// Audit rows matching the query, newest first
    pub fetch_logs: Vec<FetchLogInfo>,
    /// Cursor for the next page; absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Query parameters for listing fetch logs
#[derive(Debug, Deserialize)]
pub struct FetchLogsQuery {
    /// Filter by dealer ID (UUID)
    pub dealer_id: Option<String>,
    /// Filter by fetch type (e.g. work_order)
    pub fetch_type: Option<String>,
    /// Filter by outcome status
    pub status: Option<String>,
    /// Only rows that started at or after this timestamp (RFC 3339)
    pub started_after: Option<String>,
    /// Only rows that started at or before this timestamp (RFC 3339)
    pub started_before: Option<String>,
    /// Opaque cursor from a previous page
    pub cursor: Option<String>,
    /// Maximum number of rows to return (default: 50, max: 100)
    pub limit: Option<u32>,
}

/// List fetch audit rows, newest first
#[utoipa::path(
    get,
    path = "/fetch-logs",
    security(("bearer_auth" = [])),
    params(
        ("dealer_id" = Option<String>, Query, description = "Filter by dealer ID (UUID)"),
        ("fetch_type" = Option<String>, Query, description = "Filter by fetch type"),
        ("status" = Option<String>, Query, description = "Filter by outcome status"),
        ("started_after" = Option<String>, Query, description = "Only rows started at or after this RFC 3339 timestamp"),
        ("started_before" = Option<String>, Query, description = "Only rows started at or before this RFC 3339 timestamp"),
        ("cursor" = Option<String>, Query, description = "Opaque cursor from a previous page"),
        ("limit" = Option<u32>, Query, description = "Maximum number of rows to return (default 50, max 100)")
    ),
    responses(
        (status = 200, description = "Audit rows matching the query", body = FetchLogsResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "fetch-logs"
)]
pub async fn list_fetch_logs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(params): Query<FetchLogsQuery>,
) -> Result<Json<FetchLogsResponse>, ApiError> {
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
        Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
            validation_error(
                "Invalid identifier",
                serde_json::json!({ "dealer_id": "Must be a valid UUID" }),
            )
        })?),
        None => None,
    };

    let started_after = match &params.started_after {
        Some(raw) => Some(parse_timestamp_param("started_after", raw)?),
        None => None,
    };
    let started_before = match &params.started_before {
        Some(raw) => Some(parse_timestamp_param("started_before", raw)?),
        None => None,
    };

    let cursor = match &params.cursor {
        Some(raw) => Some(decode_cursor(raw)?),
        None => None,
    };

    // Fetch one extra row to decide whether another page exists.
    let mut logs = FetchLogRepository::new(&state.db)
        .list(FetchLogFilter {
            dealer_id,
            fetch_type,
            status,
            started_after,
            started_before,
            cursor,
            limit: u64::from(limit) + 1,
        })
        .await?;

    let next_cursor = if logs.len() > limit as usize {
        logs.truncate(limit as usize);
        logs.last().map(|last| {
            let created_at: DateTime<Utc> = last.created_at.into();
            encode_cursor(&created_at, &last.id)
        })
    } else {
        None
    };

    Ok(Json(FetchLogsResponse {
        fetch_logs: logs.into_iter().map(FetchLogInfo::from).collect(),
        next_cursor,
    }))
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

fn parse_timestamp_param(field: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            validation_error(
                "Invalid timestamp",
                serde_json::json!({ field: "Must be a valid ISO 8601 timestamp (RFC 3339)" }),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        response::Response,
    };
    use migration::{Migrator, MigratorTrait};
    use sea_orm::prelude::DateTimeWithTimeZone;
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
    use tower::ServiceExt;

    use crate::config::{AppConfig, UpsertConfig};
    use crate::crypto::CryptoKey;
    use crate::models::{JobStatus, sync_job};
    use crate::processors::ProcessorRegistry;
    use crate::queue::JobQueue;
    use crate::repositories::dealer::NewDealer;
    use crate::repositories::{DealerRepository, FetchLogRepository};

    const TOKEN: &str = "Bearer test-token-123";

    async fn setup() -> (Router, DatabaseConnection, Uuid, Uuid) {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("connect test db");
        Migrator::up(&db, None).await.expect("run migrations");

        let config = Arc::new(AppConfig {
            operator_tokens: vec!["test-token-123".to_string()],
            ..Default::default()
        });
        let registry = Arc::new(ProcessorRegistry::with_default_processors(
            &UpsertConfig::default(),
        ));
        let queue = JobQueue::new(db.clone(), Arc::clone(&registry));
        let crypto_key = CryptoKey::new(vec![7u8; 32]).expect("test key");

        let dealer = DealerRepository::new(&db)
            .create(
                &crypto_key,
                NewDealer {
                    code: "D001".to_string(),
                    name: "Test Dealer".to_string(),
                    api_key: "api-key".to_string(),
                    secret_key: "secret".to_string(),
                    active: true,
                },
            )
            .await
            .expect("create dealer");

        let now: DateTimeWithTimeZone = Utc::now().into();
        let job = sync_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            dealer_id: Set(dealer.id),
            fetch_type: Set("work_order".to_string()),
            range_from: Set(now),
            range_to: Set(now),
            filters: Set(None),
            status: Set("succeeded".to_string()),
            result: Set(None),
            error_message: Set(None),
            created_at: Set(now),
            started_at: Set(Some(now)),
            completed_at: Set(Some(now)),
        }
        .insert(&db)
        .await
        .expect("insert job");

        let state = crate::server::AppState {
            config,
            db: db.clone(),
            queue,
            registry,
            crypto_key,
        };
        (
            crate::server::create_app(state),
            db,
            dealer.id,
            job.id,
        )
    }

    async fn append_log(db: &DatabaseConnection, job_id: Uuid, dealer_id: Uuid, status: JobStatus) {
        use crate::models::FetchType;
        use crate::repositories::fetch_log::NewFetchLog;

        let now: DateTimeWithTimeZone = Utc::now().into();
        FetchLogRepository::new(db)
            .append(NewFetchLog {
                job_id,
                dealer_id,
                fetch_type: FetchType::WorkOrder,
                status,
                records_fetched: 7,
                error_message: (status == JobStatus::Failed)
                    .then(|| "partner API returned status 500".to_string()),
                duration_ms: 250,
                started_at: now,
                finished_at: now,
            })
            .await
            .expect("append log");
    }

    fn authed(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, TOKEN)
            .body(Body::empty())
            .unwrap()
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn listing_returns_audit_rows() {
        let (app, db, dealer_id, job_id) = setup().await;
        append_log(&db, job_id, dealer_id, JobStatus::Succeeded).await;
        append_log(&db, job_id, dealer_id, JobStatus::Failed).await;

        let response = app.oneshot(authed("/fetch-logs")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let listing: FetchLogsResponse = read_json(response).await;
        assert_eq!(listing.fetch_logs.len(), 2);
        assert!(listing.next_cursor.is_none());
    }

    #[tokio::test]
    async fn status_filter_narrows_rows() {
        let (app, db, dealer_id, job_id) = setup().await;
        append_log(&db, job_id, dealer_id, JobStatus::Succeeded).await;
        append_log(&db, job_id, dealer_id, JobStatus::Failed).await;

        let response = app
            .oneshot(authed("/fetch-logs?status=failed"))
            .await
            .unwrap();

        let listing: FetchLogsResponse = read_json(response).await;
        assert_eq!(listing.fetch_logs.len(), 1);
        assert_eq!(listing.fetch_logs[0].status, "failed");
        assert!(
            listing.fetch_logs[0]
                .error_message
                .as_deref()
                .unwrap()
                .contains("500")
        );
    }

    #[tokio::test]
    async fn pagination_hands_out_a_cursor_and_pages_do_not_overlap() {
        let (app, db, dealer_id, job_id) = setup().await;
        for _ in 0..3 {
            append_log(&db, job_id, dealer_id, JobStatus::Succeeded).await;
        }

        let response = app
            .clone()
            .oneshot(authed("/fetch-logs?limit=2"))
            .await
            .unwrap();
        let first: FetchLogsResponse = read_json(response).await;
        assert_eq!(first.fetch_logs.len(), 2);
        let cursor = first.next_cursor.expect("expected a next page");

        let response = app
            .oneshot(authed(&format!("/fetch-logs?limit=2&cursor={}", urlencode(&cursor))))
            .await
            .unwrap();
        let second: FetchLogsResponse = read_json(response).await;
        assert_eq!(second.fetch_logs.len(), 1);
        assert!(second.next_cursor.is_none());

        let first_ids: Vec<&str> = first.fetch_logs.iter().map(|log| log.id.as_str()).collect();
        assert!(
            second
                .fetch_logs
                .iter()
                .all(|log| !first_ids.contains(&log.id.as_str()))
        );
    }

    #[tokio::test]
    async fn invalid_cursor_is_400() {
        let (app, _db, _dealer_id, _job_id) = setup().await;

        let response = app
            .oneshot(authed("/fetch-logs?cursor=not-a-cursor"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ApiError = read_json(response).await;
        assert_eq!(error.code.to_string(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn invalid_limit_is_400() {
        let (app, _db, _dealer_id, _job_id) = setup().await;

        let response = app.oneshot(authed("/fetch-logs?limit=101")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fetch_logs_require_operator_auth() {
        let (app, _db, _dealer_id, _job_id) = setup().await;

        let request = Request::builder()
            .method("GET")
            .uri("/fetch-logs")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Base64 cursors may contain '+' and '=' which must be escaped in a query
    // string.
    fn urlencode(value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for byte in value.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    out.push(byte as char)
                }
                _ => out.push_str(&format!("%{:02X}", byte)),
            }
        }
        out
    }
}
