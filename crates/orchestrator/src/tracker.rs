use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::entities::{
    AckReceipt, ChannelStatus, DispatchChannel, DispatchSession,
};

/// 确认跟踪器
///
/// 会话通道状态的唯一变更入口。所有写操作串行通过内部锁，
/// 读操作返回一致性快照。状态迁移单调趋向终态：
/// 任何试图离开终态的迁移都会被拒绝为 `InvalidTransition`，
/// 由调用方记录日志后忽略，绝不中断编排循环。
pub struct AcknowledgmentTracker {
    session: RwLock<DispatchSession>,
}

impl AcknowledgmentTracker {
    pub fn new(session: DispatchSession) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }

    /// 返回当前会话快照，从不阻塞写入方以外的调用
    pub async fn snapshot(&self) -> DispatchSession {
        self.session.read().await.clone()
    }

    pub async fn session_id(&self) -> uuid::Uuid {
        self.session.read().await.session_id
    }

    pub async fn channel_status(&self, channel: DispatchChannel) -> Option<ChannelStatus> {
        self.session
            .read()
            .await
            .channel_state(channel)
            .map(|state| state.status)
    }

    pub async fn is_sealed(&self) -> bool {
        self.session.read().await.is_sealed()
    }

    /// 标记通道进入投递中，并为本次尝试计数
    pub async fn mark_in_flight(&self, channel: DispatchChannel) -> DispatchResult<u32> {
        let mut session = self.session.write().await;
        Self::check_transition(&session, channel, ChannelStatus::InFlight)?;

        let state = session
            .channel_states
            .get_mut(&channel)
            .ok_or_else(|| DispatchError::Internal(format!("未配置的通道: {channel}")))?;
        state.status = ChannelStatus::InFlight;
        state.attempt_count += 1;
        let attempt = state.attempt_count;

        session.recompute_overall();
        Ok(attempt)
    }

    /// 标记通道已确认，acknowledged_at只设置一次
    pub async fn mark_acknowledged(
        &self,
        channel: DispatchChannel,
        receipt: &AckReceipt,
    ) -> DispatchResult<DateTime<Utc>> {
        let mut session = self.session.write().await;
        Self::check_transition(&session, channel, ChannelStatus::Acknowledged)?;

        let acknowledged_at = receipt.received_at;
        let state = session
            .channel_states
            .get_mut(&channel)
            .ok_or_else(|| DispatchError::Internal(format!("未配置的通道: {channel}")))?;
        state.status = ChannelStatus::Acknowledged;
        state.acknowledged_at = Some(acknowledged_at);
        state.last_error = None;

        session.recompute_overall();
        Ok(acknowledged_at)
    }

    /// 记录一次投递失败
    pub async fn mark_failed(&self, channel: DispatchChannel, error: &str) -> DispatchResult<()> {
        self.transition(channel, ChannelStatus::Failed, Some(error.to_string()))
            .await
    }

    /// 通道在退避等待期间回到PENDING
    pub async fn mark_retry_pending(&self, channel: DispatchChannel) -> DispatchResult<()> {
        self.transition(channel, ChannelStatus::Pending, None).await
    }

    /// 重试预算耗尽，通道进入终态
    pub async fn mark_exhausted(
        &self,
        channel: DispatchChannel,
        error: &str,
    ) -> DispatchResult<()> {
        self.transition(channel, ChannelStatus::Exhausted, Some(error.to_string()))
            .await
    }

    /// 会话截止或被取消时，将所有未终态通道标记为超时。
    /// 返回被标记的通道集合。
    pub async fn expire_non_terminal(&self, reason: &str) -> Vec<DispatchChannel> {
        let mut session = self.session.write().await;
        let mut expired = Vec::new();

        for state in session.channel_states.values_mut() {
            if !state.status.is_terminal() {
                state.status = ChannelStatus::TimedOut;
                state.last_error = Some(reason.to_string());
                expired.push(state.channel);
            }
        }

        if !expired.is_empty() {
            session.recompute_overall();
            debug!(
                "会话 {} 的 {} 个通道被标记为超时: {}",
                session.session_id,
                expired.len(),
                reason
            );
        }

        expired
    }

    /// 封存会话并返回最终快照，封存后只读
    pub async fn seal(&self) -> DispatchSession {
        let mut session = self.session.write().await;
        if session.sealed_at.is_none() {
            session.sealed_at = Some(Utc::now());
        }
        session.clone()
    }

    async fn transition(
        &self,
        channel: DispatchChannel,
        to: ChannelStatus,
        error: Option<String>,
    ) -> DispatchResult<()> {
        let mut session = self.session.write().await;
        Self::check_transition(&session, channel, to)?;

        let state = session
            .channel_states
            .get_mut(&channel)
            .ok_or_else(|| DispatchError::Internal(format!("未配置的通道: {channel}")))?;
        state.status = to;
        if error.is_some() {
            state.last_error = error;
        }

        session.recompute_overall();
        Ok(())
    }

    fn check_transition(
        session: &DispatchSession,
        channel: DispatchChannel,
        to: ChannelStatus,
    ) -> DispatchResult<()> {
        if session.is_sealed() {
            return Err(DispatchError::SessionSealed {
                id: session.session_id,
            });
        }

        let state = session
            .channel_state(channel)
            .ok_or_else(|| DispatchError::Internal(format!("未配置的通道: {channel}")))?;

        if state.status.is_terminal() {
            return Err(DispatchError::InvalidTransition {
                channel: channel.to_string(),
                from: state.status.to_string(),
                to: to.to_string(),
            });
        }

        Ok(())
    }
}
