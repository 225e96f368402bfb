//! # Error Handling
//!
//! This module provides unified error handling for the Dealer Sync API:
//! the `SyncError` taxonomy produced by the fetch pipeline and a consistent
//! problem+json response format with trace ID propagation.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::telemetry;

/// Errors produced while validating, fetching, or persisting a sync job.
///
/// The executor records the display string of whichever variant killed the
/// job into `sync_jobs.error_message` and the matching fetch log row.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Request rejected before any work happened.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced dealer does not exist.
    #[error("unknown dealer: {0}")]
    UnknownDealer(Uuid),

    /// The dealer exists but is deactivated.
    #[error("dealer {0} is inactive")]
    InactiveDealer(Uuid),

    /// The fetch type is canonical but has no registered processor.
    #[error("unsupported fetch type: {0}")]
    UnsupportedFetchType(String),

    /// The referenced job does not exist.
    #[error("unknown job: {0}")]
    UnknownJob(Uuid),

    /// The job exists but is not in a state that allows the requested
    /// transition. Only queued jobs can be cancelled.
    #[error("job {job_id} is {status}, only queued jobs can be cancelled")]
    NotCancellable { job_id: Uuid, status: String },

    /// Partner API rejected our credentials even after a token refresh.
    #[error("partner authentication failed: {0}")]
    Auth(String),

    /// Network-level failure that survived the retry budget.
    #[error("network error after retries: {0}")]
    TransientNetwork(String),

    /// Partner API answered with a non-success status. The body is carried
    /// verbatim so operators see exactly what the partner said.
    #[error("partner API returned status {status}: {body}")]
    Partner { status: u16, body: String },

    /// Fetched payload violated a structural expectation.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Dealer credential encryption or decryption failed.
    #[error("credential error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    /// A pipeline phase failed after earlier phases already committed.
    #[error("phase '{phase}' failed ({committed_phases} phase(s) committed): {source}")]
    Phase {
        phase: &'static str,
        committed_phases: u32,
        #[source]
        source: Box<SyncError>,
    },

    /// The whole job exceeded its wall-clock ceiling.
    #[error("job timed out after {0} seconds")]
    Timeout(u64),

    /// Database failure.
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

impl SyncError {
    /// Wrap an error that occurred mid-pipeline, preserving how far the
    /// preceding phases got.
    pub fn phase(phase: &'static str, committed_phases: u32, source: SyncError) -> Self {
        SyncError::Phase {
            phase,
            committed_phases,
            source: Box::new(source),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        SyncError::TransientNetwork(error.to_string())
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                // Fallback: generate a correlation ID for basic client-server log correlation
                Some(format!("corr-{}", &Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const MYSQL_DUPLICATE_CODES: &[&str] = &["1022", "1062", "1169", "1586"];
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE
            || MYSQL_DUPLICATE_CODES.contains(&code_str)
            || SQLITE_DUPLICATE_CODES.contains(&code_str)
        {
            return true;
        }
    }

    false
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Bad Request")]
    BadRequest,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not Found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Bad Gateway")]
    BadGateway,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::Forbidden => StatusCode::FORBIDDEN,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code string for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::Unauthorized => "UNAUTHORIZED",
            ErrorType::Forbidden => "FORBIDDEN",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::BadGateway => "PARTNER_ERROR",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Upstream partner API error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PartnerErrorDetails {
    /// Partner endpoint that failed (e.g., "pkb", "prospect")
    pub endpoint: String,
    /// HTTP status code from the partner API
    pub status: u16,
    /// Response body snippet from the partner API (truncated)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        // Add Retry-After header if present
        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            &error_type.to_string(),
        )
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::Validation(message) => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &message,
            ),
            SyncError::UnknownDealer(dealer_id) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Dealer not found: {}", dealer_id),
            ),
            SyncError::InactiveDealer(dealer_id) => Self::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                &format!("Dealer {} is inactive", dealer_id),
            ),
            SyncError::UnsupportedFetchType(fetch_type) => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &format!("Unsupported fetch type: {}", fetch_type),
            ),
            SyncError::UnknownJob(job_id) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Job not found: {}", job_id),
            ),
            SyncError::NotCancellable { job_id, status } => Self::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                &format!("Job {} is {}, only queued jobs can be cancelled", job_id, status),
            ),
            SyncError::Auth(message) => Self::new(
                StatusCode::BAD_GATEWAY,
                "PARTNER_ERROR",
                &format!("Partner authentication failed: {}", message),
            ),
            SyncError::TransientNetwork(message) => Self::new(
                StatusCode::BAD_GATEWAY,
                "PARTNER_ERROR",
                &format!("Partner API unreachable: {}", message),
            ),
            SyncError::Partner { status, body } => {
                partner_error("partner".to_string(), status, Some(body))
            }
            SyncError::Db(db_error) => db_error.into(),
            other => {
                tracing::error!("Sync failure: {:?}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    &other.to_string(),
                )
            }
        }
    }
}

/// Create a partner upstream error (502)
pub fn partner_error(endpoint: String, status: u16, body: Option<String>) -> ApiError {
    let details = PartnerErrorDetails {
        endpoint: endpoint.clone(),
        status,
        body_snippet: body.map(|b| {
            if b.chars().count() > 200 {
                let truncated: String = b.chars().take(200).collect();
                format!("{}...", truncated)
            } else {
                b
            }
        }),
    };

    ApiError::new(
        StatusCode::BAD_GATEWAY,
        "PARTNER_ERROR",
        &format!("Partner endpoint {} returned error status {}", endpoint, status),
    )
    .with_details(json!(details))
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    let mut error = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a forbidden error (403)
pub fn forbidden(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Insufficient permissions");
    ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
        assert!(error.trace_id.is_some());
    }

    #[test]
    fn api_error_with_details() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", "Test error message")
            .with_details(json!({"field": "value"}));

        assert_eq!(error.details, Some(Box::new(json!({"field": "value"}))));
    }

    #[test]
    fn content_type_and_status_preserved() {
        let error = ApiError::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");

        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn retry_after_header_is_emitted() {
        let error = ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database service unavailable",
        )
        .with_retry_after(60);

        let response = error.into_response();

        assert_eq!(response.headers().get("retry-after").unwrap(), "60");
    }

    #[test]
    fn validation_maps_to_400() {
        let api_error: ApiError = SyncError::Validation("range_from after range_to".into()).into();

        assert_eq!(api_error.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_error.code, Box::from("VALIDATION_FAILED"));
        assert!(api_error.message.contains("range_from"));
    }

    #[test]
    fn unknown_dealer_maps_to_404() {
        let dealer_id = Uuid::new_v4();
        let api_error: ApiError = SyncError::UnknownDealer(dealer_id).into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert!(api_error.message.contains(&dealer_id.to_string()));
    }

    #[test]
    fn inactive_dealer_maps_to_409() {
        let api_error: ApiError = SyncError::InactiveDealer(Uuid::new_v4()).into();

        assert_eq!(api_error.status, StatusCode::CONFLICT);
        assert_eq!(api_error.code, Box::from("CONFLICT"));
    }

    #[test]
    fn unsupported_fetch_type_maps_to_400() {
        let api_error: ApiError = SyncError::UnsupportedFetchType("leasing".into()).into();

        assert_eq!(api_error.status, StatusCode::BAD_REQUEST);
        assert!(api_error.message.contains("leasing"));
    }

    #[test]
    fn unknown_job_maps_to_404() {
        let job_id = Uuid::new_v4();
        let api_error: ApiError = SyncError::UnknownJob(job_id).into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert!(api_error.message.contains(&job_id.to_string()));
    }

    #[test]
    fn not_cancellable_maps_to_409() {
        let api_error: ApiError = SyncError::NotCancellable {
            job_id: Uuid::new_v4(),
            status: "running".into(),
        }
        .into();

        assert_eq!(api_error.status, StatusCode::CONFLICT);
        assert!(api_error.message.contains("running"));
    }

    #[test]
    fn partner_failures_map_to_502() {
        let statuses: Vec<ApiError> = vec![
            SyncError::Auth("token rejected twice".into()).into(),
            SyncError::TransientNetwork("connection reset".into()).into(),
            SyncError::Partner {
                status: 500,
                body: "upstream exploded".into(),
            }
            .into(),
        ];

        for api_error in statuses {
            assert_eq!(api_error.status, StatusCode::BAD_GATEWAY);
            assert_eq!(api_error.code, Box::from("PARTNER_ERROR"));
        }
    }

    #[test]
    fn partner_error_carries_verbatim_body_snippet() {
        let api_error: ApiError = SyncError::Partner {
            status: 403,
            body: "{\"status\":0,\"message\":\"invalid dealer\"}".into(),
        }
        .into();

        let details = api_error.details.expect("details should be set");
        let details_obj = details.as_object().unwrap();
        assert_eq!(details_obj.get("status").unwrap(), 403);
        assert!(
            details_obj
                .get("body_snippet")
                .unwrap()
                .as_str()
                .unwrap()
                .contains("invalid dealer")
        );
    }

    #[test]
    fn partner_error_truncates_long_bodies_on_char_boundaries() {
        let long_body = "pärtner says nö ".repeat(50);
        let error = partner_error("pkb".to_string(), 500, Some(long_body.clone()));

        let details = error.details.unwrap();
        let snippet = details
            .as_object()
            .unwrap()
            .get("body_snippet")
            .unwrap()
            .as_str()
            .unwrap();

        assert!(snippet.chars().count() <= 203);
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn phase_error_reports_committed_phases() {
        let error = SyncError::phase(
            "work_order_services",
            1,
            SyncError::DataIntegrity("ragged payload".into()),
        );

        let message = error.to_string();
        assert!(message.contains("work_order_services"));
        assert!(message.contains("1 phase(s) committed"));
        assert!(message.contains("ragged payload"));
    }

    #[test]
    fn record_not_found_maps_to_404() {
        let db_error = sea_orm::DbErr::RecordNotFound("sync_job".to_string());
        let api_error: ApiError = db_error.into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert!(api_error.message.contains("sync_job"));
    }

    #[test]
    fn auth_error_helpers() {
        let auth_error = unauthorized(None);
        assert_eq!(auth_error.status, StatusCode::UNAUTHORIZED);
        assert_eq!(auth_error.message, Box::from("Authentication required"));

        let custom = unauthorized(Some("Invalid token"));
        assert_eq!(custom.message, Box::from("Invalid token"));

        let forbidden_error = forbidden(None);
        assert_eq!(forbidden_error.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn validation_error_carries_field_details() {
        let field_errors = json!({
            "fetch_type": "unknown value",
            "range_to": "must not precede range_from"
        });

        let error = validation_error("Validation failed", field_errors.clone());

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.details, Some(Box::new(field_errors)));
    }
}
