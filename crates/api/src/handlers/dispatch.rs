use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use dispatch_domain::entities::{AckReceipt, DispatchChannel, Location, TriageResult};

use crate::{
    error::{ApiError, ApiResult},
    response::{created, success, ApiResponse},
    routes::AppState,
};

/// 调度发起请求
#[derive(Debug, Deserialize)]
pub struct InitiateDispatchRequest {
    pub triage_result: TriageResult,
    pub location: Location,
    /// 省略时使用配置的默认通道集合
    pub channels: Option<Vec<String>>,
}

/// 合作方确认回调请求
#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub channel: String,
    pub responder_id: Option<String>,
    pub note: Option<String>,
}

/// 会话列表查询参数
#[derive(Debug, Deserialize)]
pub struct DispatchQueryParams {
    pub limit: Option<i64>,
}

fn parse_channels(names: &[String]) -> Result<Vec<DispatchChannel>, ApiError> {
    names
        .iter()
        .map(|name| {
            DispatchChannel::parse(name)
                .ok_or_else(|| ApiError::BadRequest(format!("未知通道: {name}")))
        })
        .collect()
}

/// 发起调度会话，立即返回初始快照，通道投递在后台并行执行
pub async fn initiate_dispatch(
    State(state): State<AppState>,
    Json(request): Json<InitiateDispatchRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let channels = match &request.channels {
        Some(names) => parse_channels(names)?,
        None => state.default_channels.clone(),
    };

    let session = state
        .orchestrator
        .initiate(request.triage_result, request.location, channels)
        .await?;

    Ok(created(session))
}

/// 查询会话状态
pub async fn get_dispatch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let session = state.orchestrator.get_status(id).await?;
    Ok(success(session))
}

/// 查询近期会话列表
pub async fn list_dispatches(
    State(state): State<AppState>,
    Query(params): Query<DispatchQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let sessions = state.orchestrator.recent_sessions(limit).await?;
    Ok(success(sessions))
}

/// 取消会话，幂等操作
pub async fn cancel_dispatch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl axum::response::IntoResponse> {
    state.orchestrator.cancel_session(id).await?;
    Ok(ApiResponse::success_empty_with_message(format!(
        "会话 {id} 取消请求已接受"
    )))
}

/// 合作方确认回调，重复确认为空操作
pub async fn acknowledge_dispatch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AcknowledgeRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let channel = DispatchChannel::parse(&request.channel)
        .ok_or_else(|| ApiError::BadRequest(format!("未知通道: {}", request.channel)))?;

    let receipt = AckReceipt {
        channel,
        responder_id: request.responder_id,
        received_at: Utc::now(),
        note: request.note,
    };

    state.orchestrator.on_acknowledgment(id, channel, receipt).await?;
    Ok(ApiResponse::success_empty_with_message(format!(
        "通道 {channel} 确认已记录"
    )))
}
