use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dispatch_core::DispatchError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度错误: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type, suggestions) = match &self {
            ApiError::Dispatch(DispatchError::SessionNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("调度会话 {} 不存在", id),
                "SESSION_NOT_FOUND".to_string(),
                vec![
                    "请检查会话ID是否正确".to_string(),
                    "使用 GET /api/dispatch 查看近期会话".to_string(),
                ],
            ),
            ApiError::Dispatch(DispatchError::SessionSealed { id }) => (
                StatusCode::CONFLICT,
                format!("调度会话 {} 已封存，不再接受状态变更", id),
                "SESSION_SEALED".to_string(),
                vec![
                    "会话已到达最终状态".to_string(),
                    "使用 GET /api/dispatch/{id} 查看最终结果".to_string(),
                ],
            ),
            ApiError::Dispatch(DispatchError::InvalidTransition { channel, from, to }) => (
                StatusCode::CONFLICT,
                format!("通道 {} 非法状态迁移: {} -> {}", channel, from, to),
                "INVALID_TRANSITION".to_string(),
                vec![
                    "通道已到达终态，不再接受状态变更".to_string(),
                    "请刷新会话状态后重试".to_string(),
                ],
            ),
            ApiError::Dispatch(DispatchError::InvalidRequest(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数无效: {}", msg),
                "INVALID_REQUEST".to_string(),
                vec![
                    "请检查分诊结果、位置和通道列表".to_string(),
                    "通道取值: ambulance, hospital, volunteer, family_sms".to_string(),
                ],
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {}", msg),
                "BAD_REQUEST".to_string(),
                vec![
                    "请检查请求格式和参数".to_string(),
                    "确保Content-Type正确设置".to_string(),
                ],
            ),
            ApiError::Serialization(err) => (
                StatusCode::BAD_REQUEST,
                "请求数据格式错误".to_string(),
                "SERIALIZATION_ERROR".to_string(),
                vec![
                    "请检查JSON格式是否正确".to_string(),
                    format!("详细错误: {}", err),
                ],
            ),
            ApiError::Dispatch(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR".to_string(),
                vec![
                    "系统遇到内部错误，请稍后重试".to_string(),
                    "查看 GET /health 检查系统状态".to_string(),
                ],
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR".to_string(),
                vec![
                    "系统遇到内部错误，请稍后重试".to_string(),
                    format!("错误详情: {}", msg),
                ],
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
