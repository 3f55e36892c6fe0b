use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify, RwLock};
use tracing::debug;
use uuid::Uuid;

use dispatch_domain::entities::DispatchChannel;

use crate::tracker::AcknowledgmentTracker;

/// 活跃会话句柄
///
/// 持有跟踪器、会话级取消信号和各通道的外部确认通知。
/// 取消信号由截止时间看门狗或显式cancel触发，
/// 外部确认通知用于抢占对应通道的退避等待。
pub struct ActiveSession {
    pub tracker: Arc<AcknowledgmentTracker>,
    cancel_tx: broadcast::Sender<()>,
    ack_notifiers: HashMap<DispatchChannel, Arc<Notify>>,
}

impl ActiveSession {
    pub fn new(tracker: Arc<AcknowledgmentTracker>, channels: &[DispatchChannel]) -> Self {
        let (cancel_tx, _) = broadcast::channel(4);
        let ack_notifiers = channels
            .iter()
            .map(|&channel| (channel, Arc::new(Notify::new())))
            .collect();

        Self {
            tracker,
            cancel_tx,
            ack_notifiers,
        }
    }

    pub fn subscribe_cancel(&self) -> broadcast::Receiver<()> {
        self.cancel_tx.subscribe()
    }

    /// 向所有通道任务广播取消，忽略无接收者的情况
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(());
    }

    pub fn ack_notifier(&self, channel: DispatchChannel) -> Option<Arc<Notify>> {
        self.ack_notifiers.get(&channel).cloned()
    }
}

/// 活跃会话注册表
///
/// 进程内唯一的全局状态，服务启动时创建。异步确认回调通过它定位会话。
/// 会话封存后延迟一个保留窗口再移除，以便迟到的回调仍能命中。
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<ActiveSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, session_id: Uuid, session: Arc<ActiveSession>) {
        self.sessions.write().await.insert(session_id, session);
    }

    pub async fn get(&self, session_id: Uuid) -> Option<Arc<ActiveSession>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn remove(&self, session_id: Uuid) -> Option<Arc<ActiveSession>> {
        self.sessions.write().await.remove(&session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// 保留窗口到期后移除会话
    pub fn remove_after(self: &Arc<Self>, session_id: Uuid, retention: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if registry.remove(session_id).await.is_some() {
                debug!("会话 {} 保留期结束，已从注册表移除", session_id);
            }
        });
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
