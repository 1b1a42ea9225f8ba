// src/mock_ads_service.rs

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{serve, Json, Router};
use chrono::{Duration, Utc};
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use rand::Rng;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing::info;

use crate::model::adapters::AdRecord;

/// 使用 proptest 生成随机的 AdRecord（wire shape）
/// - placement / tier / status 从服务端枚举词表中取值，偶尔混入未知值，
///   用于演练引擎的容错路径（未知槽位永不可选、未知层级排最低）
/// - 投放窗口在今天前后随机铺开，保证 Scheduled / Active / Expired 都会出现
fn generate_ad_record() -> impl Strategy<Value = AdRecord> {
    (
        "[a-z0-9]{8}",
        "[A-Z][a-z]{4,10}",
        prop_oneof![
            4 => Just("DASHBOARD"),
            4 => Just("SIDEBAR"),
            4 => Just("COURSE_PLAYER"),
            4 => Just("COURSE_LISTING"),
            4 => Just("POPUP"),
            1 => Just("LEGACY_SLOT"),
        ],
        prop_oneof![
            3 => Just("GOLD"),
            3 => Just("SILVER"),
            3 => Just("BRONZE"),
            1 => Just("PLATINUM"),
        ],
        prop_oneof![
            6 => Just("ACTIVE"),
            2 => Just("PAUSED"),
            1 => Just("DELETED"),
        ],
        (-20i64..10, 1i64..40),
        any::<bool>(),
    )
        .prop_map(|(id, sponsor, placement, tier, status, (start_off, flight_len), video)| {
            let now = Utc::now();
            let start = now + Duration::days(start_off);
            let end = start + Duration::days(flight_len);
            let mut rng = rand::thread_rng();
            let impressions: u64 = rng.gen_range(0..5000);
            let clicks = if impressions == 0 {
                0
            } else {
                rng.gen_range(0..impressions / 10 + 1)
            };
            AdRecord {
                id: format!("ad-{}", id),
                sponsor_name: sponsor.clone(),
                title: format!("{} sponsored course", sponsor),
                description: "Mock sponsor advertisement".to_string(),
                image_url: if video { None } else { Some(format!("http://cdn.mock.local/{}.png", id)) },
                video_url: if video { Some(format!("http://cdn.mock.local/{}.mp4", id)) } else { None },
                cta_url: Some("http://sponsor.mock.local/landing".to_string()),
                cta_label: Some("Learn more".to_string()),
                start_date: Some(start.format("%Y-%m-%d").to_string()),
                end_date: Some(end.format("%Y-%m-%d").to_string()),
                status: status.to_string(),
                placement: placement.to_string(),
                tier: tier.to_string(),
                target_roles: vec![],
                target_categories: vec![],
                target_batches: vec![],
                impressions: Some(impressions),
                view_count: None,
                clicks: Some(clicks),
                click_count: None,
                daily_impressions: vec![],
                org_id: None,
            }
        })
}

/// 生成一批种子广告（10~20 条），保证至少一条立即可投放
pub fn seed_ad_records() -> Vec<AdRecord> {
    let mut runner = proptest::test_runner::TestRunner::default();
    let mut records = proptest::collection::vec(generate_ad_record(), 10..20)
        .new_tree(&mut runner)
        .unwrap()
        .current();

    if let Some(first) = records.first_mut() {
        let now = Utc::now();
        first.status = "ACTIVE".to_string();
        first.placement = "DASHBOARD".to_string();
        first.tier = "GOLD".to_string();
        first.start_date = Some((now - Duration::days(1)).format("%Y-%m-%d").to_string());
        first.end_date = Some((now + Duration::days(30)).format("%Y-%m-%d").to_string());
    }

    println!("Generated {} mock ad records", records.len());
    for r in &records {
        println!(
            "ID: {}, Sponsor: {}, Placement: {}, Tier: {}, Status: {}",
            r.id, r.sponsor_name, r.placement, r.tier, r.status
        );
    }
    records
}

type MockState = Arc<Mutex<Vec<AdRecord>>>;

async fn list_ads(State(state): State<MockState>) -> Json<Vec<AdRecord>> {
    let ads = state.lock().unwrap().clone();
    info!("Mock ad service: list -> {} records", ads.len());
    Json(ads)
}

async fn update_ad(
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(record): Json<AdRecord>,
) -> StatusCode {
    let mut ads = state.lock().unwrap();
    match ads.iter_mut().find(|r| r.id == id) {
        Some(existing) => {
            *existing = record;
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn delete_ad(State(state): State<MockState>, Path(id): Path<String>) -> StatusCode {
    let mut ads = state.lock().unwrap();
    let before = ads.len();
    ads.retain(|r| r.id != id);
    if ads.len() < before {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// 启动 Mock 广告管理服务
/// 监听指定端口（例如 9101），提供 /ads 的 list / update / delete
pub async fn start_mock_ads_service(port: u16) {
    let state: MockState = Arc::new(Mutex::new(seed_ad_records()));
    let app = Router::new()
        .route("/ads", get(list_ads))
        .route("/ads/{id}", axum::routing::put(update_ad).delete(delete_ad))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    info!("Mock ad management service running at http://{}", addr);

    let listener = TcpListener::bind(&addr).await.unwrap();
    serve(listener, app).await.unwrap();
}
