use async_trait::async_trait;
use dispatch_core::DispatchResult;

use crate::entities::{AckReceipt, AlertPayload, DispatchChannel};

/// 通道适配器接口
///
/// 每个应急通道（急救车、医院、志愿者、家属短信）对应一个适配器实例，
/// 被视为独立失效的远程调用。单次调用的超时由编排器统一施加，
/// 适配器只负责一次投递尝试并返回确认回执或失败。
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// 适配器服务的通道
    fn channel(&self) -> DispatchChannel;

    /// 执行一次投递尝试
    ///
    /// 瞬时故障返回 `DispatchError::ChannelDelivery`，由重试策略处理。
    async fn attempt_delivery(&self, alert: &AlertPayload) -> DispatchResult<AckReceipt>;
}
