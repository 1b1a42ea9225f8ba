// src/api/handlers.rs

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::analytics::aggregator::compute_analytics;
use crate::config::config_manager::ConfigManager;
use crate::error::EngineError;
use crate::logging::delivery_logger::DeliveryLogger;
use crate::logging::serve_log::ServeLog;
use crate::model::ad::{AdPatch, Placement};
use crate::model::adapters::FileCacheAdapter;
use crate::model::context::TargetingContext;
use crate::serving::ads_client::AdsServiceClient;
use crate::store::ad_store::{AdStore, NewAdPayload};

pub type EngineStore = AdStore<AdsServiceClient, FileCacheAdapter>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EngineStore>,
    pub delivery_logger: Arc<DeliveryLogger>,
    pub config: Arc<ConfigManager>,
}

fn error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::AdNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Upstream(_) | EngineError::Decode(_) => StatusCode::BAD_GATEWAY,
    }
}

/// **单个最优广告**：200 + 广告体，无候选时 204（无广告可填充）
pub async fn get_primary_ad(
    State(state): State<Arc<AppState>>,
    Path(slot): Path<String>,
    Query(ctx): Query<TargetingContext>,
) -> Response {
    let Some(placement) = Placement::from_slug(&slot) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown placement" })))
            .into_response();
    };
    let start = Instant::now();
    let ranked = state.store.active_ads_by_placement(placement, &ctx);

    let mut serve = ServeLog::new(&Uuid::new_v4().to_string(), placement, &ctx);
    serve.settle(&ranked, start.elapsed().as_millis());
    state.delivery_logger.log_serve(&serve).await;

    match ranked.into_iter().next() {
        Some(ad) => (StatusCode::OK, Json(ad)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// **排序后的全部候选**
pub async fn get_placement_ads(
    State(state): State<Arc<AppState>>,
    Path(slot): Path<String>,
    Query(ctx): Query<TargetingContext>,
) -> Response {
    let Some(placement) = Placement::from_slug(&slot) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown placement" })))
            .into_response();
    };
    Json(state.store.active_ads_by_placement(placement, &ctx)).into_response()
}

pub async fn list_ads(State(state): State<Arc<AppState>>) -> Response {
    Json(state.store.snapshot()).into_response()
}

/// 本地新建（不回调管理服务，由下一次 refresh 对账）
pub async fn create_ad(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAdPayload>,
) -> Response {
    let ad = state.store.add_ad(payload);
    (StatusCode::CREATED, Json(ad)).into_response()
}

pub async fn update_ad(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<AdPatch>,
) -> Response {
    match state.store.update_ad(&id, patch).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            state
                .delivery_logger
                .log("ERROR", &format!("update_ad {} failed: {}", id, e))
                .await;
            (error_status(&e), Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

pub async fn delete_ad(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.store.delete_ad(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            state
                .delivery_logger
                .log("ERROR", &format!("delete_ad {} failed: {}", id, e))
                .await;
            (error_status(&e), Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Active / Paused 翻转；过期或不存在的广告返回 409
pub async fn toggle_ad(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.store.toggle_ad_status(&id) {
        Some(status) => Json(json!({ "id": id, "status": status })).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "ad is expired, deleted or unknown" })),
        )
            .into_response(),
    }
}

pub async fn get_analytics(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = compute_analytics(
        &state.store.snapshot(),
        chrono::Utc::now(),
        state.config.analytics_window_days,
    );
    Json(snapshot).into_response()
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> Response {
    match state.store.refresh().await {
        Ok(()) => Json(json!({ "ads": state.store.len() })).into_response(),
        Err(e) => {
            state
                .delivery_logger
                .log("ERROR", &format!("manual refresh failed: {}", e))
                .await;
            (error_status(&e), Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ads", get(list_ads).post(create_ad))
        .route("/ads/{id}", patch(update_ad).delete(delete_ad))
        .route("/ads/{id}/toggle", post(toggle_ad))
        .route("/placements/{slot}/primary", get(get_primary_ad))
        .route("/placements/{slot}/ads", get(get_placement_ads))
        .route("/analytics", get(get_analytics))
        .route("/refresh", post(refresh))
        .with_state(state)
}
