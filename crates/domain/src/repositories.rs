use async_trait::async_trait;
use dispatch_core::DispatchResult;
use uuid::Uuid;

use crate::entities::DispatchSession;

/// 会话存储接口
///
/// 编排器在每次通道终态迁移和会话封存时写入快照，
/// 快照按session_id覆盖写（upsert）。
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 持久化会话快照
    async fn persist(&self, snapshot: &DispatchSession) -> DispatchResult<()>;

    /// 按会话ID查询
    async fn get_by_id(&self, session_id: Uuid) -> DispatchResult<Option<DispatchSession>>;

    /// 按创建时间倒序返回最近的会话
    async fn list_recent(&self, limit: i64) -> DispatchResult<Vec<DispatchSession>>;
}
