pub mod handlers;
pub mod middleware;

use crate::{config::ServerConfig, models::ModelManager, scan::TumorClass, Config, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 共享应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub models: Arc<ModelManager>,
}

pub async fn serve(config: Config) -> Result<()> {
    // 启动时一次性加载全部模型，失败则直接退出
    let models = Arc::new(ModelManager::new(config.clone())?);

    // 构建应用路由
    let state = AppState {
        config: config.clone(),
        models,
    };
    let app = create_app(state);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        crate::utils::error::ScanError::Config(format!(
            "Invalid bind address {}: {}",
            config.bind_addr, e
        ))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!(
        "Workers: {}, max connections: {}, dev mode: {}",
        config.workers,
        config.server_config.max_connections,
        config.dev_mode
    );
    tracing::info!("API endpoints:");
    tracing::info!("  POST /scan        - JSON base64 upload");
    tracing::info!("  POST /scan/upload - Multipart file upload");
    tracing::info!("  GET  /health      - Health check");
    tracing::info!("  GET  /api/info    - Service information");

    // 启动服务器
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        crate::utils::error::ScanError::Internal(format!(
            "Failed to bind to address {}: {}",
            addr, e
        ))
    })?;

    axum::serve(listener, app).await.map_err(|e| {
        crate::utils::error::ScanError::Internal(format!("Server failed to start: {}", e))
    })?;

    Ok(())
}

fn create_app(state: AppState) -> Router {
    let server_config = state.config.server_config.clone();

    let router = Router::new()
        // 扫描API路由
        .route("/scan", post(handlers::scan_json_handler))
        .route("/scan/upload", post(handlers::scan_upload_handler))
        // 系统路由
        .route("/", get(info_handler))
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        // 传递状态到处理器
        .with_state(state);

    apply_middleware(router, &server_config)
}

fn apply_middleware(router: Router, config: &ServerConfig) -> Router {
    router
        // 添加中间件 - 使用分层模式避免复杂类型嵌套
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        // Json/Multipart提取器自带2MB上限，和tower-http的限制一起放宽到配置值
        .layer(DefaultBodyLimit::max(config.max_request_size))
        .layer(RequestBodyLimitLayer::new(config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout)))
        .layer(CorsLayer::permissive()) // 开发环境使用宽松CORS
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    state.models.health_check()?;

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.models.get_stats();

    Json(json!({
        "service": "ONNX NeuroScan Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "models": stats,
        "classes": TumorClass::all()
            .iter()
            .map(|c| c.display_name())
            .collect::<Vec<_>>(),
        "features": {
            "dual_upload_modes": true,
            "segmentation_overlay": true
        }
    }))
}
