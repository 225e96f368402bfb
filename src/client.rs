//! # Partner API Client
//!
//! HTTP client for the dealer management gateway. Every fetch is a POST to
//! `{base_url}/{endpoint}` carrying a time-windowed JSON body and the three
//! authentication headers produced by the [`TokenManager`]. Transient
//! failures (connect/timeout errors and 5xx responses) are retried with
//! exponential backoff and jitter; a 401 triggers exactly one forced token
//! refresh; all other non-2xx responses fail immediately with the partner's
//! body preserved verbatim.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, thread_rng};
use reqwest::StatusCode;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PartnerApiConfig;
use crate::error::SyncError;
use crate::token::TokenManager;

/// Header carrying the dealer API key.
pub const HEADER_API_KEY: &str = "X-Api-Key";
/// Header carrying the derivation timestamp in epoch milliseconds.
pub const HEADER_REQUEST_TIME: &str = "X-Request-Time";
/// Header carrying the derived request token.
pub const HEADER_API_TOKEN: &str = "X-Api-Token";

/// Timestamp layout the gateway expects in request bodies.
const BODY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything a single fetch call needs about the dealer and time window.
///
/// Built by the executor after decrypting the dealer secret; processors pass
/// it through to [`PartnerClient::fetch`] unchanged.
#[derive(Clone)]
pub struct FetchContext {
    /// Dealer code as registered with the partner, sent in the request body.
    pub dealer_code: String,
    /// Dealer API key for the authentication headers.
    pub api_key: String,
    /// Decrypted dealer secret used for token derivation. Never logged.
    pub secret_key: String,
    /// Window start, inclusive.
    pub from_time: DateTimeWithTimeZone,
    /// Window end, inclusive.
    pub to_time: DateTimeWithTimeZone,
    /// Optional endpoint-specific body fields, e.g. a status filter.
    pub filters: Option<JsonValue>,
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("dealer_code", &self.dealer_code)
            .field("api_key", &self.api_key)
            .field("secret_key", &"[REDACTED]")
            .field("from_time", &self.from_time)
            .field("to_time", &self.to_time)
            .field("filters", &self.filters)
            .finish()
    }
}

/// Response envelope every gateway endpoint wraps its payload in.
#[derive(Debug, serde::Deserialize)]
struct PartnerEnvelope {
    status: i64,
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Vec<JsonValue>>,
}

/// Client for the partner DMS gateway.
pub struct PartnerClient {
    http: reqwest::Client,
    base_url: Url,
    config: PartnerApiConfig,
    tokens: Arc<TokenManager>,
}

impl PartnerClient {
    /// Build a client from validated configuration.
    pub fn new(config: PartnerApiConfig, tokens: Arc<TokenManager>) -> Result<Self, SyncError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            SyncError::Validation(format!("invalid partner API base URL: {}", e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SyncError::Validation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            config,
            tokens,
        })
    }

    /// Fetch one time window of records from the given endpoint.
    ///
    /// Returns the rows from the envelope's `data` array. An envelope with
    /// `status != 1` is a partner-side rejection even under HTTP 200 and is
    /// surfaced with the body verbatim, so the job's `error_message` shows
    /// exactly what the gateway said.
    pub async fn fetch(
        &self,
        endpoint: &str,
        ctx: &FetchContext,
    ) -> Result<Vec<JsonValue>, SyncError> {
        let url = self.endpoint_url(endpoint)?;
        let body = build_request_body(ctx);

        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            let headers = self.tokens.get_headers(&ctx.api_key, &ctx.secret_key)?;
            debug!(
                endpoint,
                dealer_code = %ctx.dealer_code,
                attempt,
                "sending partner API request"
            );

            let outcome = self
                .http
                .post(url.clone())
                .header(HEADER_API_KEY, &headers.api_key)
                .header(HEADER_REQUEST_TIME, headers.request_time_ms.to_string())
                .header(HEADER_API_TOKEN, &headers.token)
                .json(&body)
                .send()
                .await;

            let response = match outcome {
                Ok(response) => response,
                Err(error) => match self.retry_delay(attempt) {
                    Some(delay) => {
                        warn!(
                            endpoint,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "partner request failed, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    None => return Err(SyncError::TransientNetwork(error.to_string())),
                },
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(error) => match self.retry_delay(attempt) {
                    Some(delay) => {
                        warn!(
                            endpoint,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "failed to read partner response body, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    None => return Err(SyncError::TransientNetwork(error.to_string())),
                },
            };

            if status == StatusCode::UNAUTHORIZED {
                if !refreshed {
                    info!(endpoint, "partner returned 401, forcing token refresh");
                    refreshed = true;
                    self.tokens.force_refresh(&ctx.api_key, &ctx.secret_key)?;
                    continue;
                }
                return Err(SyncError::Auth(format!(
                    "'{}' rejected credentials after token refresh: {}",
                    endpoint, text
                )));
            }

            if status.is_server_error() {
                match self.retry_delay(attempt) {
                    Some(delay) => {
                        warn!(
                            endpoint,
                            attempt,
                            status = status.as_u16(),
                            delay_ms = delay.as_millis() as u64,
                            "partner returned server error, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    None => {
                        return Err(SyncError::Partner {
                            status: status.as_u16(),
                            body: text,
                        });
                    }
                }
            }

            if !status.is_success() {
                return Err(SyncError::Partner {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let envelope: PartnerEnvelope = match serde_json::from_str(&text) {
                Ok(envelope) => envelope,
                Err(error) => {
                    return Err(SyncError::DataIntegrity(format!(
                        "'{}' returned a malformed envelope ({}): {}",
                        endpoint,
                        error,
                        snippet(&text)
                    )));
                }
            };

            if envelope.status != 1 {
                return Err(SyncError::Partner {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let rows = envelope.data.unwrap_or_default();
            debug!(endpoint, rows = rows.len(), "partner API request succeeded");
            return Ok(rows);
        }
    }

    /// Resolve the full URL for an endpoint under the configured base URL.
    fn endpoint_url(&self, endpoint: &str) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SyncError::Validation(format!(
                    "partner API base URL '{}' cannot carry endpoint paths",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push(endpoint);
        Ok(url)
    }

    /// Backoff before retry number `attempt + 1`, or `None` when the budget
    /// is spent.
    fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.config.max_retries {
            return None;
        }

        let base_ms = self.config.retry_base_ms as f64;
        let max_ms = self.config.retry_max_ms as f64;
        let mut backoff = (base_ms * 2_f64.powi(attempt as i32)).min(max_ms);
        if self.config.retry_jitter_factor > 0.0 {
            backoff += thread_rng().gen_range(0.0..(self.config.retry_jitter_factor * backoff));
        }

        Some(Duration::from_millis(backoff as u64))
    }
}

/// Assemble the request body: caller-supplied filters first, then the window
/// fields, so filters can never override `dealer_code` or the time range.
fn build_request_body(ctx: &FetchContext) -> JsonValue {
    let mut body = serde_json::Map::new();

    if let Some(JsonValue::Object(filters)) = &ctx.filters {
        for (key, value) in filters {
            body.insert(key.clone(), value.clone());
        }
    }

    body.insert(
        "dealer_code".to_string(),
        JsonValue::String(ctx.dealer_code.clone()),
    );
    body.insert(
        "from_time".to_string(),
        JsonValue::String(ctx.from_time.format(BODY_TIME_FORMAT).to_string()),
    );
    body.insert(
        "to_time".to_string(),
        JsonValue::String(ctx.to_time.format(BODY_TIME_FORMAT).to_string()),
    );

    JsonValue::Object(body)
}

/// First 200 characters of a body for error messages, on a char boundary.
fn snippet(body: &str) -> &str {
    let mut end = body.len().min(200);
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> PartnerApiConfig {
        PartnerApiConfig {
            base_url: base_url.to_string(),
            timeout_seconds: 5,
            max_retries: 2,
            retry_base_ms: 1,
            retry_max_ms: 4,
            retry_jitter_factor: 0.0,
        }
    }

    fn test_client(base_url: &str) -> PartnerClient {
        let tokens = Arc::new(TokenManager::with_parts(Duration::from_secs(3600), 8));
        PartnerClient::new(test_config(base_url), tokens).unwrap()
    }

    fn test_context() -> FetchContext {
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        FetchContext {
            dealer_code: "DLR001".to_string(),
            api_key: "DLR001-key".to_string(),
            secret_key: "s3cret".to_string(),
            from_time: offset.with_ymd_and_hms(2026, 5, 20, 8, 0, 0).unwrap(),
            to_time: offset.with_ymd_and_hms(2026, 5, 20, 9, 0, 0).unwrap(),
            filters: None,
        }
    }

    #[tokio::test]
    async fn success_envelope_returns_data_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pkb"))
            .and(header_exists(HEADER_API_KEY))
            .and(header_exists(HEADER_REQUEST_TIME))
            .and(header_exists(HEADER_API_TOKEN))
            .and(body_partial_json(json!({
                "dealer_code": "DLR001",
                "from_time": "2026-05-20 08:00:00",
                "to_time": "2026-05-20 09:00:00",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 1,
                "message": "ok",
                "data": [{"noWorkOrder": "WO-1"}, {"noWorkOrder": "WO-2"}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let rows = client.fetch("pkb", &test_context()).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["noWorkOrder"], "WO-1");
    }

    #[tokio::test]
    async fn missing_data_array_is_an_empty_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prospect"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": 1, "message": "no rows"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let rows = client.fetch("prospect", &test_context()).await.unwrap();

        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pkb"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/pkb"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": 1, "message": "ok", "data": [{"id": 1}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let rows = client.fetch("pkb", &test_context()).await.unwrap();

        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retry_budget_surfaces_partner_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pkb"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
            .expect(3) // initial attempt + max_retries
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client.fetch("pkb", &test_context()).await.unwrap_err();

        match error {
            SyncError::Partner { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal failure");
            }
            other => panic!("expected partner error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn client_errors_fail_immediately_with_verbatim_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/billing"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("dealer code not recognised"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client.fetch("billing", &test_context()).await.unwrap_err();

        match error {
            SyncError::Partner { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "dealer code not recognised");
            }
            other => panic!("expected partner error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unauthorized_forces_one_token_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pkb"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/pkb"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": 1, "message": "ok", "data": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.fetch("pkb", &test_context()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        let first_token = requests[0].headers.get(HEADER_API_TOKEN).unwrap();
        let second_token = requests[1].headers.get(HEADER_API_TOKEN).unwrap();
        assert_ne!(first_token, second_token);
    }

    #[tokio::test]
    async fn second_unauthorized_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pkb"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .expect(2) // original attempt + one post-refresh attempt
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client.fetch("pkb", &test_context()).await.unwrap_err();

        match error {
            SyncError::Auth(message) => assert!(message.contains("bad credentials")),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn envelope_rejection_under_http_200_is_a_partner_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pkb"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": 0, "message": "invalid dealer code"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client.fetch("pkb", &test_context()).await.unwrap_err();

        match error {
            SyncError::Partner { status, body } => {
                assert_eq!(status, 200);
                assert!(body.contains("invalid dealer code"));
            }
            other => panic!("expected partner error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_data_integrity_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pkb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client.fetch("pkb", &test_context()).await.unwrap_err();

        assert!(matches!(error, SyncError::DataIntegrity(_)));
    }

    #[test]
    fn filters_cannot_override_window_fields() {
        let mut ctx = test_context();
        ctx.filters = Some(json!({
            "status_filter": "open",
            "dealer_code": "SPOOFED",
        }));

        let body = build_request_body(&ctx);

        assert_eq!(body["status_filter"], "open");
        assert_eq!(body["dealer_code"], "DLR001");
        assert_eq!(body["from_time"], "2026-05-20 08:00:00");
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let rendered = format!("{:?}", test_context());

        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn endpoint_url_handles_base_paths_with_and_without_slash() {
        let tokens = Arc::new(TokenManager::with_parts(Duration::from_secs(3600), 8));
        let client =
            PartnerClient::new(test_config("https://gateway.example.com/dms/v1"), tokens.clone())
                .unwrap();
        assert_eq!(
            client.endpoint_url("pkb").unwrap().as_str(),
            "https://gateway.example.com/dms/v1/pkb"
        );

        let client =
            PartnerClient::new(test_config("https://gateway.example.com/dms/v1/"), tokens)
                .unwrap();
        assert_eq!(
            client.endpoint_url("pkb").unwrap().as_str(),
            "https://gateway.example.com/dms/v1/pkb"
        );
    }
}
