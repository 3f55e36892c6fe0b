use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use dispatch_core::DispatchResult;
use dispatch_domain::entities::DispatchSession;
use dispatch_domain::repositories::SessionStore;

/// 内存会话存储，用于内嵌模式和测试
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, DispatchSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn persist(&self, snapshot: &DispatchSession) -> DispatchResult<()> {
        self.sessions
            .write()
            .await
            .insert(snapshot.session_id, snapshot.clone());
        Ok(())
    }

    async fn get_by_id(&self, session_id: Uuid) -> DispatchResult<Option<DispatchSession>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn list_recent(&self, limit: i64) -> DispatchResult<Vec<DispatchSession>> {
        let mut sessions: Vec<DispatchSession> =
            self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit.max(0) as usize);
        Ok(sessions)
    }
}
