use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use dispatch_domain::entities::DispatchChannel;
use dispatch_orchestrator::DispatchOrchestrator;

use crate::handlers::{
    dispatch::{
        acknowledge_dispatch, cancel_dispatch, get_dispatch, initiate_dispatch, list_dispatches,
    },
    health::health_check,
};
use crate::middleware::{cors_layer, request_logging, trace_layer};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DispatchOrchestrator>,
    pub default_channels: Vec<DispatchChannel>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 调度会话API
        .route("/api/dispatch", get(list_dispatches).post(initiate_dispatch))
        .route("/api/dispatch/{id}", get(get_dispatch))
        .route("/api/dispatch/{id}/cancel", post(cancel_dispatch))
        // 合作方确认回调
        .route("/api/dispatch/{id}/ack", post(acknowledge_dispatch))
        .with_state(state)
}

/// 创建带中间件的完整应用
pub fn create_app(state: AppState, cors_enabled: bool) -> Router {
    let mut app = create_routes(state)
        .layer(axum::middleware::from_fn(request_logging))
        .layer(trace_layer());

    if cors_enabled {
        app = app.layer(cors_layer());
    }

    app
}
