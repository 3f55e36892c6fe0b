use thiserror::Error;
use uuid::Uuid;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("调度会话未找到: {id}")]
    SessionNotFound { id: Uuid },

    #[error("调度会话已封存: {id}")]
    SessionSealed { id: Uuid },

    #[error("通道 {channel} 非法状态迁移: {from} -> {to}")]
    InvalidTransition {
        channel: String,
        from: String,
        to: String,
    },

    #[error("请求参数无效: {0}")]
    InvalidRequest(String),

    #[error("通道投递失败: {0}")]
    ChannelDelivery(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    /// 判断错误是否为瞬时故障，瞬时故障在重试预算内不会终结通道
    pub fn is_transient(&self) -> bool {
        matches!(self, DispatchError::ChannelDelivery(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = Uuid::new_v4();
        let error = DispatchError::SessionNotFound { id };
        assert!(error.to_string().contains(&id.to_string()));

        let error = DispatchError::InvalidTransition {
            channel: "ambulance".to_string(),
            from: "EXHAUSTED".to_string(),
            to: "IN_FLIGHT".to_string(),
        };
        assert!(error.to_string().contains("ambulance"));
        assert!(error.to_string().contains("EXHAUSTED"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(DispatchError::ChannelDelivery("连接被拒绝".to_string()).is_transient());
        assert!(!DispatchError::Internal("boom".to_string()).is_transient());
    }
}
