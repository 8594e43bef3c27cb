//! HTTP glue: translates requests into core calls and core results into
//! JSON. No business logic lives here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::alert::Alerter;
use crate::blob::BlobStore;
use crate::error::{ServiceError, StoreError};
use crate::ingest::Ingestor;
use crate::models::{Application, CrashSubmission};
use crate::store::{AppStats, CrashFilter, GroupFilter, GroupSort, IndexedStore, SortDirection, DEFAULT_PAGE_LIMIT};

const API_KEY_HEADER: &str = "x-bugapp-key";

/// Shared server state: the store, blob store, and alerter handed to every
/// request handler.
pub struct AppState {
    pub store: Arc<Mutex<IndexedStore>>,
    pub blobs: Arc<BlobStore>,
    pub alerter: Alerter,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/apps", post(create_app))
        .route("/apps/{app_id}/crash", post(submit_crash))
        .route("/apps/{app_id}/crashes", get(list_crashes))
        .route("/apps/{app_id}/crashes/{id}", get(get_crash))
        .route("/apps/{app_id}/groups", get(list_groups))
        .route("/apps/{app_id}/groups/{id}", get(get_group))
        .route("/apps/{app_id}/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new())
        .with_state(state)
}

fn hash_key(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(digest)
}

/// Looks up the app named by the path and checks the request's credential
/// header against its stored hash.
async fn authenticate(
    state: &AppState,
    app_id: &str,
    headers: &axum::http::HeaderMap,
) -> Result<Application, ServiceError> {
    let app = {
        let store = state.store.lock().await;
        store.get_app(app_id)?.ok_or(StoreError::NotFound)?
    };
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServiceError::Unauthorized)?;
    if hash_key(presented) != app.api_key_hash {
        return Err(ServiceError::Unauthorized);
    }
    Ok(app)
}

#[derive(Debug, serde::Serialize)]
struct CreateAppResponse {
    app_id: String,
    name: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CreateAppRequest {
    name: String,
    #[serde(default)]
    retention_days: Option<i64>,
}

/// POST /apps — administrative app creation. The plaintext credential is
/// returned exactly once; only its hash is ever stored.
async fn create_app(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAppRequest>,
) -> Result<Json<CreateAppResponse>, ServiceError> {
    let app_id = uuid::Uuid::new_v4().to_string();
    let api_key = uuid::Uuid::new_v4().to_string();
    let api_key_hash = hash_key(&api_key);
    let retention_days = request.retention_days.unwrap_or(crate::config::DEFAULT_RETENTION_DAYS);

    let store = state.store.lock().await;
    store.create_app(&app_id, &request.name, &api_key_hash, retention_days)?;

    Ok(Json(CreateAppResponse {
        app_id,
        name: request.name,
        api_key,
    }))
}

/// POST /apps/{app_id}/crash — the ingestion endpoint.
async fn submit_crash(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    headers: axum::http::HeaderMap,
    Json(submission): Json<CrashSubmission>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let app = authenticate(&state, &app_id, &headers).await?;

    let mut store = state.store.lock().await;
    let mut ingestor = Ingestor::new(&mut store, &state.blobs, &state.alerter);
    let result = ingestor
        .submit(&app, submission)
        .map_err(ServiceError::from)?;

    Ok(Json(serde_json::json!({
        "crash_id": result.crash_id,
        "group_id": result.group_id,
        "fingerprint": result.fingerprint,
        "is_new_group": result.is_new_group,
    })))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    search: Option<String>,
}

async fn list_crashes(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    headers: axum::http::HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    authenticate(&state, &app_id, &headers).await?;
    let store = state.store.lock().await;
    let filter = CrashFilter {
        app_id: Some(app_id),
        platform: params.platform,
        environment: params.environment,
        error_type: params.error_type,
        search: params.search,
        ..Default::default()
    };
    let page = store.list_crashes(&filter, params.offset, params.limit.unwrap_or(DEFAULT_PAGE_LIMIT))?;
    Ok(Json(serde_json::json!({ "crashes": page.crashes, "total": page.total })))
}

async fn get_crash(
    State(state): State<Arc<AppState>>,
    Path((app_id, id)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Result<Json<crate::models::Crash>, ServiceError> {
    authenticate(&state, &app_id, &headers).await?;
    let store = state.store.lock().await;
    let crash = store.get_crash(&id)?.ok_or(StoreError::NotFound)?;
    if crash.app_id != app_id {
        return Err(ServiceError::Store(StoreError::NotFound));
    }
    Ok(Json(crash))
}

async fn list_groups(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    headers: axum::http::HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    authenticate(&state, &app_id, &headers).await?;
    let store = state.store.lock().await;
    let filter = GroupFilter {
        app_id: Some(app_id),
        error_type: params.error_type,
        search: params.search,
        ..Default::default()
    };
    let page = store.list_groups(
        &filter,
        GroupSort::LastSeen,
        SortDirection::Desc,
        params.offset,
        params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
    )?;
    Ok(Json(serde_json::json!({ "groups": page.groups, "total": page.total })))
}

async fn get_group(
    State(state): State<Arc<AppState>>,
    Path((app_id, id)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Result<Json<crate::models::CrashGroup>, ServiceError> {
    authenticate(&state, &app_id, &headers).await?;
    let store = state.store.lock().await;
    let group = store.get_group(&id)?.ok_or(StoreError::NotFound)?;
    if group.app_id != app_id {
        return Err(ServiceError::Store(StoreError::NotFound));
    }
    Ok(Json(group))
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<AppStats>, ServiceError> {
    authenticate(&state, &app_id, &headers).await?;
    let store = state.store.lock().await;
    Ok(Json(store.app_stats(&app_id)?))
}
