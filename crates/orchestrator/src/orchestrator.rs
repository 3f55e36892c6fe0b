use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dispatch_core::{DispatchConfig, DispatchError, DispatchResult};
use dispatch_domain::entities::{
    AckReceipt, AlertPayload, ChannelStatus, DispatchChannel, DispatchSession, Location,
    OverallStatus, TriageResult,
};
use dispatch_domain::ports::ChannelAdapter;
use dispatch_domain::repositories::SessionStore;

use crate::registry::{ActiveSession, SessionRegistry};
use crate::retry::RetryPolicy;
use crate::tracker::AcknowledgmentTracker;

/// 编排器运行参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// 单次通道投递的超时时间
    pub attempt_timeout: Duration,
    /// 会话级截止时间
    pub session_deadline: Duration,
    /// 会话封存后在注册表中的保留时间
    pub registry_retention: Duration,
    /// 重试策略
    pub retry: RetryPolicy,
    /// 部分确认时的升级策略开关
    pub escalation_enabled: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            session_deadline: Duration::from_secs(120),
            registry_retention: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            escalation_enabled: false,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            attempt_timeout: Duration::from_secs(config.attempt_timeout_seconds),
            session_deadline: Duration::from_secs(config.session_deadline_seconds),
            registry_retention: Duration::from_secs(config.registry_retention_seconds),
            retry: RetryPolicy::from_config(config),
            escalation_enabled: config.escalation_enabled,
        }
    }
}

/// 调度编排器
///
/// 将一次分诊结果并行扇出到所有配置通道。各通道是独立的失效域，
/// 任何通道的失败或缓慢都不会延迟或阻塞其他通道的激活；
/// 编排器同时维护一份一致的确认覆盖视图供下游消费。
pub struct DispatchOrchestrator {
    adapters: HashMap<DispatchChannel, Arc<dyn ChannelAdapter>>,
    store: Arc<dyn SessionStore>,
    registry: Arc<SessionRegistry>,
    settings: OrchestratorSettings,
}

impl DispatchOrchestrator {
    pub fn new(
        adapters: HashMap<DispatchChannel, Arc<dyn ChannelAdapter>>,
        store: Arc<dyn SessionStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            adapters,
            store,
            registry: Arc::new(SessionRegistry::new()),
            settings,
        }
    }

    /// 发起一次多通道调度
    ///
    /// 创建会话并为每个配置通道启动一个独立的投递任务，
    /// 所有尝试发出后立即返回会话快照（不等待任何通道完成），
    /// 调用方通过 `get_status` 轮询后续进展。
    pub async fn initiate(
        &self,
        triage_result: TriageResult,
        location: Location,
        channels: Vec<DispatchChannel>,
    ) -> DispatchResult<DispatchSession> {
        let channels = self.validate_request(&triage_result, &location, channels)?;

        let session = DispatchSession::new(triage_result, location, &channels);
        let session_id = session.session_id;
        let tracker = Arc::new(AcknowledgmentTracker::new(session));
        let active = Arc::new(ActiveSession::new(Arc::clone(&tracker), &channels));
        self.registry.insert(session_id, Arc::clone(&active)).await;

        let snapshot = tracker.snapshot().await;
        if let Err(e) = self.store.persist(&snapshot).await {
            warn!("持久化会话 {} 初始快照失败: {}", session_id, e);
        }

        let mut channel_tasks = JoinSet::new();
        for &channel in &channels {
            let adapter = self
                .adapters
                .get(&channel)
                .cloned()
                .ok_or_else(|| DispatchError::Internal(format!("通道 {channel} 缺少适配器")))?;
            let ack_notify = active
                .ack_notifier(channel)
                .ok_or_else(|| DispatchError::Internal(format!("通道 {channel} 缺少确认通知")))?;

            let ctx = ChannelRunContext {
                channel,
                adapter,
                tracker: Arc::clone(&tracker),
                store: Arc::clone(&self.store),
                policy: self.settings.retry.clone(),
                attempt_timeout: self.settings.attempt_timeout,
                alert: AlertPayload::for_channel(&snapshot, channel),
                cancel_rx: active.subscribe_cancel(),
                ack_notify,
            };
            channel_tasks.spawn(run_channel(ctx));
        }

        info!(
            "会话 {} 已发起，{} 个通道并行投递: [{}]",
            session_id,
            channels.len(),
            channels
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        tokio::spawn(supervise_session(
            channel_tasks,
            active,
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            session_id,
            self.settings.session_deadline,
            self.settings.registry_retention,
            self.settings.escalation_enabled,
        ));

        Ok(snapshot)
    }

    /// 返回会话当前快照，从不阻塞。
    /// 活跃会话由注册表提供，已封存会话回落到存储。
    pub async fn get_status(&self, session_id: Uuid) -> DispatchResult<DispatchSession> {
        if let Some(active) = self.registry.get(session_id).await {
            return Ok(active.tracker.snapshot().await);
        }

        self.store
            .get_by_id(session_id)
            .await?
            .ok_or(DispatchError::SessionNotFound { id: session_id })
    }

    /// 取消会话：所有未终态通道标记为超时，未完成的投递与退避等待被取消。
    /// 对已封存会话幂等。
    pub async fn cancel_session(&self, session_id: Uuid) -> DispatchResult<()> {
        if let Some(active) = self.registry.get(session_id).await {
            if active.tracker.is_sealed().await {
                debug!("会话 {} 已封存，取消为空操作", session_id);
                return Ok(());
            }

            info!("显式取消会话 {}", session_id);
            active.tracker.expire_non_terminal("会话被显式取消").await;
            active.cancel();
            return Ok(());
        }

        match self.store.get_by_id(session_id).await? {
            Some(_) => {
                debug!("会话 {} 已封存，取消为空操作", session_id);
                Ok(())
            }
            None => Err(DispatchError::SessionNotFound { id: session_id }),
        }
    }

    /// 异步确认回调入口（如合作方webhook）
    ///
    /// 幂等：通道已处于终态时为空操作，只记录日志；
    /// 否则等同于一次同步投递成功，并抢占该通道尚未执行的重试。
    pub async fn on_acknowledgment(
        &self,
        session_id: Uuid,
        channel: DispatchChannel,
        receipt: AckReceipt,
    ) -> DispatchResult<()> {
        if let Some(active) = self.registry.get(session_id).await {
            match active.tracker.mark_acknowledged(channel, &receipt).await {
                Ok(_) => {
                    info!("会话 {} 通道 {} 收到外部确认", session_id, channel);
                    if let Some(notify) = active.ack_notifier(channel) {
                        notify.notify_one();
                    }
                    persist_snapshot(&active.tracker, self.store.as_ref()).await;
                    Ok(())
                }
                Err(DispatchError::InvalidTransition { from, .. }) => {
                    debug!(
                        "会话 {} 通道 {} 的重复或迟到确认被忽略（当前状态 {}）",
                        session_id, channel, from
                    );
                    Ok(())
                }
                Err(DispatchError::SessionSealed { .. }) => {
                    debug!("会话 {} 已封存，外部确认被忽略", session_id);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else {
            match self.store.get_by_id(session_id).await? {
                Some(_) => {
                    debug!("会话 {} 已封存且超出保留期，外部确认被忽略", session_id);
                    Ok(())
                }
                None => Err(DispatchError::SessionNotFound { id: session_id }),
            }
        }
    }

    /// 按创建时间倒序返回最近会话，活跃会话以实时快照覆盖存储中的旧快照
    pub async fn recent_sessions(&self, limit: i64) -> DispatchResult<Vec<DispatchSession>> {
        let mut sessions = self.store.list_recent(limit).await?;
        for session in sessions.iter_mut() {
            if let Some(active) = self.registry.get(session.session_id).await {
                *session = active.tracker.snapshot().await;
            }
        }
        Ok(sessions)
    }

    pub async fn active_session_count(&self) -> usize {
        self.registry.len().await
    }

    fn validate_request(
        &self,
        triage_result: &TriageResult,
        location: &Location,
        channels: Vec<DispatchChannel>,
    ) -> DispatchResult<Vec<DispatchChannel>> {
        if triage_result.classification.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "分诊结果缺少classification".to_string(),
            ));
        }

        if triage_result.severity.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "分诊结果缺少severity".to_string(),
            ));
        }

        if !location.latitude.is_finite() || !(-90.0..=90.0).contains(&location.latitude) {
            return Err(DispatchError::InvalidRequest(format!(
                "无效的纬度: {}",
                location.latitude
            )));
        }

        if !location.longitude.is_finite() || !(-180.0..=180.0).contains(&location.longitude) {
            return Err(DispatchError::InvalidRequest(format!(
                "无效的经度: {}",
                location.longitude
            )));
        }

        if channels.is_empty() {
            return Err(DispatchError::InvalidRequest(
                "通道集合不能为空".to_string(),
            ));
        }

        let mut deduped: Vec<DispatchChannel> = Vec::with_capacity(channels.len());
        for channel in channels {
            if !deduped.contains(&channel) {
                deduped.push(channel);
            }
        }

        for &channel in &deduped {
            if !self.adapters.contains_key(&channel) {
                return Err(DispatchError::InvalidRequest(format!(
                    "通道 {channel} 未配置适配器"
                )));
            }
        }

        Ok(deduped)
    }
}

/// 单个通道投递任务的上下文
struct ChannelRunContext {
    channel: DispatchChannel,
    adapter: Arc<dyn ChannelAdapter>,
    tracker: Arc<AcknowledgmentTracker>,
    store: Arc<dyn SessionStore>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    alert: AlertPayload,
    cancel_rx: broadcast::Receiver<()>,
    ack_notify: Arc<Notify>,
}

/// 单通道尝试协议
///
/// 每个通道作为独立任务运行：投递 -> 失败则按退避重试 -> 预算耗尽则终态。
/// 投递调用和退避等待都可被会话取消信号或外部确认抢占。
/// 同一通道的尝试严格串行，不同通道之间无任何排序约束。
async fn run_channel(ctx: ChannelRunContext) {
    let ChannelRunContext {
        channel,
        adapter,
        tracker,
        store,
        policy,
        attempt_timeout,
        alert,
        mut cancel_rx,
        ack_notify,
    } = ctx;
    let session_id = alert.session_id;

    loop {
        match tracker.channel_status(channel).await {
            Some(status) if !status.is_terminal() => {}
            _ => return,
        }

        let attempt = match tracker.mark_in_flight(channel).await {
            Ok(attempt) => attempt,
            Err(e) => {
                debug!("会话 {} 通道 {} 不再接受投递尝试: {}", session_id, channel, e);
                return;
            }
        };

        debug!("会话 {} 通道 {} 第 {} 次投递尝试", session_id, channel, attempt);

        let outcome = tokio::select! {
            _ = cancel_rx.recv() => return,
            _ = ack_notify.notified() => return,
            result = tokio::time::timeout(attempt_timeout, adapter.attempt_delivery(&alert)) => result,
        };

        let last_error = match outcome {
            Ok(Ok(receipt)) => {
                match tracker.mark_acknowledged(channel, &receipt).await {
                    Ok(_) => {
                        info!(
                            "会话 {} 通道 {} 在第 {} 次尝试后确认",
                            session_id, channel, attempt
                        );
                        persist_snapshot(&tracker, store.as_ref()).await;
                    }
                    Err(e) => {
                        debug!("会话 {} 通道 {} 的同步确认被忽略: {}", session_id, channel, e)
                    }
                }
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("投递尝试超时({}s)", attempt_timeout.as_secs_f64()),
        };

        warn!(
            "会话 {} 通道 {} 第 {} 次尝试失败: {}",
            session_id, channel, attempt, last_error
        );

        if !policy.has_attempts_remaining(attempt) {
            match tracker.mark_exhausted(channel, &last_error).await {
                Ok(()) => {
                    warn!(
                        "会话 {} 通道 {} 重试预算耗尽({} 次尝试)",
                        session_id, channel, attempt
                    );
                    persist_snapshot(&tracker, store.as_ref()).await;
                }
                Err(e) => debug!("会话 {} 通道 {} 终态迁移被拒绝: {}", session_id, channel, e),
            }
            return;
        }

        if let Err(e) = tracker.mark_failed(channel, &last_error).await {
            debug!("会话 {} 通道 {} 失败记录被拒绝: {}", session_id, channel, e);
            return;
        }

        // 退避等待期间回到PENDING
        if let Err(e) = tracker.mark_retry_pending(channel).await {
            debug!("会话 {} 通道 {} 重试排队被拒绝: {}", session_id, channel, e);
            return;
        }

        let delay = policy.backoff_delay(attempt);
        debug!(
            "会话 {} 通道 {} 将在 {:?} 后进行第 {} 次尝试",
            session_id,
            channel,
            delay,
            attempt + 1
        );

        tokio::select! {
            _ = cancel_rx.recv() => return,
            _ = ack_notify.notified() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// 会话看门狗
///
/// 等待所有通道任务结束或会话截止时间到达。截止触发时取消所有
/// 未完成的通道并标记超时，之后封存会话、持久化最终快照，
/// 并安排保留期后的注册表清理。
#[allow(clippy::too_many_arguments)]
async fn supervise_session(
    mut channel_tasks: JoinSet<()>,
    active: Arc<ActiveSession>,
    store: Arc<dyn SessionStore>,
    registry: Arc<SessionRegistry>,
    session_id: Uuid,
    deadline: Duration,
    retention: Duration,
    escalation_enabled: bool,
) {
    let deadline_sleep = tokio::time::sleep(deadline);
    tokio::pin!(deadline_sleep);

    loop {
        tokio::select! {
            _ = &mut deadline_sleep => {
                warn!(
                    "会话 {} 到达截止时间({}s)，取消所有未完成通道",
                    session_id,
                    deadline.as_secs_f64()
                );
                active.tracker.expire_non_terminal("会话截止时间已到").await;
                active.cancel();
                break;
            }
            joined = channel_tasks.join_next() => match joined {
                None => break,
                Some(Ok(())) => {}
                Some(Err(e)) => error!("会话 {} 的通道任务异常退出: {}", session_id, e),
            },
        }
    }

    // 等待剩余任务观察到取消信号后退出
    while let Some(result) = channel_tasks.join_next().await {
        if let Err(e) = result {
            error!("会话 {} 的通道任务异常退出: {}", session_id, e);
        }
    }

    let snapshot = active.tracker.seal().await;
    if let Err(e) = store.persist(&snapshot).await {
        warn!("持久化会话 {} 最终快照失败: {}", session_id, e);
    }

    info!(
        "会话 {} 已封存，聚合状态: {}，确认 {}/{}",
        session_id,
        snapshot.overall_status,
        snapshot.acknowledged_count(),
        snapshot.channel_states.len()
    );

    if snapshot.overall_status == OverallStatus::Partial {
        let unacked: Vec<String> = snapshot
            .channel_states
            .values()
            .filter(|state| state.status != ChannelStatus::Acknowledged)
            .map(|state| state.channel.to_string())
            .collect();
        warn!("会话 {} 部分确认，未覆盖通道: [{}]", session_id, unacked.join(", "));

        if escalation_enabled {
            info!("会话 {} 升级策略开关已启用，等待外部升级组件处理", session_id);
        }
    }

    registry.remove_after(session_id, retention);
}

async fn persist_snapshot(tracker: &AcknowledgmentTracker, store: &dyn SessionStore) {
    let snapshot = tracker.snapshot().await;
    if let Err(e) = store.persist(&snapshot).await {
        warn!("持久化会话 {} 快照失败: {}", snapshot.session_id, e);
    }
}
