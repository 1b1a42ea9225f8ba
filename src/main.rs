// src/main.rs

use axum::serve;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use rust_adserve::api::handlers::{self, AppState};
use rust_adserve::config::config_manager::ConfigManager;
use rust_adserve::logging::delivery_logger::DeliveryLogger;
use rust_adserve::mock_ads_service;
use rust_adserve::model::adapters::FileCacheAdapter;
use rust_adserve::serving::ads_client::AdsServiceClient;
use rust_adserve::store::ad_store::AdStore;

#[derive(Parser, Debug)]
#[command(author = "whiteCcinn", version = "1.0", about = "A sponsor-ad placement and ranking server")]
struct CliArgs {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
    /// 广告管理服务基地址（缺省指向内置 mock）
    #[arg(long, default_value = "http://localhost:9101")]
    upstream: String,
    /// Mock 广告管理服务端口
    #[arg(long, default_value_t = 9101)]
    mock_port: u16,
    #[arg(long, default_value = "ads_cache.json")]
    cache_path: String,
    #[arg(long, default_value = "logs")]
    log_dir: String,
    /// 统计时间序列窗口（天）
    #[arg(long, default_value_t = 7)]
    analytics_window: usize,
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // 启动 Mock 广告管理服务（监听 9101 端口）
    let mock_server = tokio::spawn({
        let port = args.mock_port;
        async move {
            mock_ads_service::start_mock_ads_service(port).await;
        }
    });

    // 初始化全局 tracing 日志
    let log_file = rolling::hourly(&args.log_dir, "adserve_log.json");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);
    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().json().with_writer(non_blocking));
    tracing::subscriber::set_global_default(subscriber)
        .expect("Unable to set global tracing subscriber");
    info!("ad serve server starting on port {}", args.port);

    // 初始化投放日志记录器（裁决日志 + 运行日志，按级别分文件批量落盘）
    let delivery_logger = DeliveryLogger::new(&args.log_dir, "delivery", 1000, 100, 1000);
    delivery_logger.log("INFO", "ad serve server is starting...").await;

    let config = Arc::new(ConfigManager::new(
        &args.upstream,
        &args.cache_path,
        &args.log_dir,
        args.analytics_window,
    ));

    // 集合生命周期管理器：缓存热加载 → 异步全量刷新
    let client = AdsServiceClient::new(&config.upstream_url);
    let cache = FileCacheAdapter::new(&config.cache_path);
    let store = Arc::new(AdStore::new(client, cache));

    if let Err(e) = store.refresh().await {
        // 启动刷新失败不致命：继续用缓存副本（可能为空）对外服务
        warn!("initial refresh failed, serving from cache: {}", e);
        delivery_logger
            .log("WARN", &format!("initial refresh failed: {}", e))
            .await;
    }

    let state = Arc::new(AppState {
        store: store.clone(),
        delivery_logger: delivery_logger.clone(),
        config: config.clone(),
    });

    let api_server = tokio::spawn({
        let state = state.clone();
        let port = args.port;
        let delivery_logger = delivery_logger.clone();
        async move {
            let app = handlers::router(state);
            let addr = format!("0.0.0.0:{}", port);
            delivery_logger
                .log("INFO", &format!("ad serve server running at http://{}", addr))
                .await;
            let listener = TcpListener::bind(&addr).await.unwrap();
            serve(listener, app).await.unwrap();
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            delivery_logger.log("INFO", "Shutting down gracefully...").await;
        }
    }

    delivery_logger.shutdown().await;
    tokio::try_join!(api_server, mock_server).unwrap();
}
