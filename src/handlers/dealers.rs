//! # Dealer API Handlers
//!
//! CRUD surface for the dealer credential store. Partner secrets go in
//! through create and update and are never echoed back; responses only ever
//! carry non-secret fields.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, SyncError, validation_error};
use crate::models::dealer;
use crate::repositories::DealerRepository;
use crate::repositories::dealer::{DealerChanges, NewDealer};
use crate::server::AppState;

/// Dealer information response. Secret material is stored encrypted and is
/// deliberately absent here.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DealerView {
    /// Unique identifier for the dealer
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Dealer code used in partner API requests
    #[schema(example = "DLR001")]
    pub code: String,
    /// Human-readable dealer name
    #[schema(example = "Mitra Motor")]
    pub name: String,
    /// Partner API key identifier
    #[schema(example = "api-key-1")]
    pub api_key: String,
    /// Whether this dealer is eligible for syncs
    pub active: bool,
    /// Timestamp when the dealer was registered
    #[schema(example = "2024-01-15T10:30:00+00:00")]
    pub created_at: String,
    /// Timestamp of the last change
    #[schema(example = "2024-01-15T10:30:00+00:00")]
    pub updated_at: String,
}

impl From<dealer::Model> for DealerView {
    fn from(model: dealer::Model) -> Self {
        Self {
            id: model.id.to_string(),
            code: model.code,
            name: model.name,
            api_key: model.api_key,
            active: model.active,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Response payload for the dealer listing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DealersResponse {
    /// All registered dealers, ordered by code
    pub dealers: Vec<DealerView>,
}

/// Request body for registering a dealer
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateDealerRequest {
    /// Dealer code used in partner API requests
    #[schema(example = "DLR001")]
    pub code: String,
    /// Human-readable dealer name
    #[schema(example = "Mitra Motor")]
    pub name: String,
    /// Partner API key identifier
    #[schema(example = "api-key-1")]
    pub api_key: String,
    /// Partner API secret; stored encrypted, never returned
    #[schema(example = "s3cr3t")]
    pub secret_key: String,
    /// Whether the dealer starts out eligible for syncs (default: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Request body for updating a dealer. Absent fields keep their value.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateDealerRequest {
    /// New dealer name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New partner API key identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// New partner API secret; stored encrypted, never returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// Toggle sync eligibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// List all registered dealers
#[utoipa::path(
    get,
    path = "/dealers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All registered dealers", body = DealersResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "dealers"
)]
pub async fn list_dealers(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<DealersResponse>, ApiError> {
    let dealers = DealerRepository::new(&state.db).list().await?;
    Ok(Json(DealersResponse {
        dealers: dealers.into_iter().map(DealerView::from).collect(),
    }))
}

/// Fetch a single dealer by ID
#[utoipa::path(
    get,
    path = "/dealers/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Dealer ID (UUID)")
    ),
    responses(
        (status = 200, description = "Dealer details", body = DealerView),
        (status = 400, description = "Invalid dealer ID", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Dealer not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "dealers"
)]
pub async fn get_dealer(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(dealer_id): Path<String>,
) -> Result<Json<DealerView>, ApiError> {
    let dealer_id = parse_dealer_id(&dealer_id)?;
    let dealer = DealerRepository::new(&state.db)
        .get(dealer_id)
        .await?
        .ok_or(SyncError::UnknownDealer(dealer_id))?;
    Ok(Json(DealerView::from(dealer)))
}

/// Register a dealer
#[utoipa::path(
    post,
    path = "/dealers",
    security(("bearer_auth" = [])),
    request_body = CreateDealerRequest,
    responses(
        (status = 201, description = "Dealer registered", body = DealerView),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 409, description = "Dealer code already exists", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "dealers"
)]
pub async fn create_dealer(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<CreateDealerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DealerView>), ApiError> {
    let Json(payload) = payload?;
    let dealer = DealerRepository::new(&state.db)
        .create(
            &state.crypto_key,
            NewDealer {
                code: payload.code,
                name: payload.name,
                api_key: payload.api_key,
                secret_key: payload.secret_key,
                active: payload.active.unwrap_or(true),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(DealerView::from(dealer))))
}

/// Update a dealer
#[utoipa::path(
    patch,
    path = "/dealers/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Dealer ID (UUID)")
    ),
    request_body = UpdateDealerRequest,
    responses(
        (status = 200, description = "Updated dealer", body = DealerView),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Dealer not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "dealers"
)]
pub async fn update_dealer(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(dealer_id): Path<String>,
    payload: Result<Json<UpdateDealerRequest>, JsonRejection>,
) -> Result<Json<DealerView>, ApiError> {
    let dealer_id = parse_dealer_id(&dealer_id)?;
    let Json(payload) = payload?;
    let dealer = DealerRepository::new(&state.db)
        .update(
            &state.crypto_key,
            dealer_id,
            DealerChanges {
                name: payload.name,
                api_key: payload.api_key,
                secret_key: payload.secret_key,
                active: payload.active,
            },
        )
        .await?;
    Ok(Json(DealerView::from(dealer)))
}

fn parse_dealer_id(value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| {
        validation_error(
            "Invalid identifier",
            serde_json::json!({ "id": "Must be a valid UUID" }),
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
        http::{Request, header},
        response::Response,
    };
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, DatabaseConnection};
    use tower::ServiceExt;

    use crate::config::{AppConfig, UpsertConfig};
    use crate::crypto::{CryptoKey, decrypt_dealer_secret};
    use crate::processors::ProcessorRegistry;
    use crate::queue::JobQueue;

    const TOKEN: &str = "Bearer test-token-123";

    async fn setup() -> (Router, DatabaseConnection, CryptoKey) {
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

        let state = crate::server::AppState {
            config,
            db: db.clone(),
            queue,
            registry,
            crypto_key: crypto_key.clone(),
        };
        (crate::server::create_app(state), db, crypto_key)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, TOKEN)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_authed(uri: &str) -> Request<Body> {
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

    fn dealer_body(code: &str) -> serde_json::Value {
        serde_json::json!({
            "code": code,
            "name": "Mitra Motor",
            "api_key": "api-key-1",
            "secret_key": "super-secret"
        })
    }

    #[tokio::test]
    async fn create_never_echoes_secret_material() {
        let (app, _db, _key) = setup().await;

        let response = app
            .oneshot(json_request("POST", "/dealers", dealer_body("DLR001")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body: serde_json::Value = read_json(response).await;
        assert_eq!(body["code"], "DLR001");
        assert_eq!(body["active"], true);
        assert!(body.get("secret_key").is_none());
        assert!(body.get("secret_key_ciphertext").is_none());
    }

    #[tokio::test]
    async fn duplicate_dealer_code_is_409() {
        let (app, _db, _key) = setup().await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/dealers", dealer_body("DLR001")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(json_request("POST", "/dealers", dealer_body("DLR001")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn blank_code_is_400() {
        let (app, _db, _key) = setup().await;

        let response = app
            .oneshot(json_request("POST", "/dealers", dealer_body("   ")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ApiError = read_json(response).await;
        assert_eq!(error.code.to_string(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn listing_orders_dealers_by_code() {
        let (app, _db, _key) = setup().await;

        app.clone()
            .oneshot(json_request("POST", "/dealers", dealer_body("B002")))
            .await
            .unwrap();
        app.clone()
            .oneshot(json_request("POST", "/dealers", dealer_body("A001")))
            .await
            .unwrap();

        let response = app.oneshot(get_authed("/dealers")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let listing: DealersResponse = read_json(response).await;
        let codes: Vec<&str> = listing
            .dealers
            .iter()
            .map(|dealer| dealer.code.as_str())
            .collect();
        assert_eq!(codes, vec!["A001", "B002"]);
    }

    #[tokio::test]
    async fn get_unknown_dealer_is_404() {
        let (app, _db, _key) = setup().await;

        let response = app
            .oneshot(get_authed(&format!("/dealers/{}", Uuid::new_v4())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_deactivates_the_dealer() {
        let (app, _db, _key) = setup().await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/dealers", dealer_body("DLR001")))
            .await
            .unwrap();
        let created: DealerView = read_json(response).await;

        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/dealers/{}", created.id),
                serde_json::json!({ "active": false }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let updated: DealerView = read_json(response).await;
        assert!(!updated.active);
    }

    #[tokio::test]
    async fn patch_rotates_the_stored_secret() {
        let (app, db, key) = setup().await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/dealers", dealer_body("DLR001")))
            .await
            .unwrap();
        let created: DealerView = read_json(response).await;
        let dealer_id = Uuid::parse_str(&created.id).unwrap();

        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/dealers/{}", created.id),
                serde_json::json!({ "secret_key": "rotated-secret" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = DealerRepository::new(&db)
            .get(dealer_id)
            .await
            .unwrap()
            .expect("dealer exists");
        assert_eq!(
            decrypt_dealer_secret(&key, &stored).unwrap(),
            "rotated-secret"
        );
    }

    #[tokio::test]
    async fn empty_patch_is_400() {
        let (app, _db, _key) = setup().await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/dealers", dealer_body("DLR001")))
            .await
            .unwrap();
        let created: DealerView = read_json(response).await;

        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/dealers/{}", created.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patch_unknown_dealer_is_404() {
        let (app, _db, _key) = setup().await;

        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/dealers/{}", Uuid::new_v4()),
                serde_json::json!({ "active": false }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dealers_require_operator_auth() {
        let (app, _db, _key) = setup().await;

        let request = Request::builder()
            .method("GET")
            .uri("/dealers")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
