use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::entities::{AckReceipt, AlertPayload, DispatchChannel};
use dispatch_domain::ports::ChannelAdapter;

/// 模拟通道适配器
///
/// 用于本地演示和嵌入式零配置模式：按配置延迟后返回确认回执，
/// 并可按failure_rate概率注入投递失败以演练重试路径。
pub struct SimulatedChannelAdapter {
    channel: DispatchChannel,
    ack_latency: Duration,
    failure_rate: f64,
}

impl SimulatedChannelAdapter {
    pub fn new(channel: DispatchChannel, ack_latency: Duration, failure_rate: f64) -> Self {
        Self {
            channel,
            ack_latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl ChannelAdapter for SimulatedChannelAdapter {
    fn channel(&self) -> DispatchChannel {
        self.channel
    }

    async fn attempt_delivery(&self, alert: &AlertPayload) -> DispatchResult<AckReceipt> {
        tokio::time::sleep(self.ack_latency).await;

        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            debug!("模拟通道 {} 注入投递失败: {}", self.channel, alert.session_id);
            return Err(DispatchError::ChannelDelivery(format!(
                "模拟通道 {} 投递失败",
                self.channel
            )));
        }

        Ok(AckReceipt {
            channel: self.channel,
            responder_id: Some(format!("sim-{}", self.channel.as_str())),
            received_at: Utc::now(),
            note: None,
        })
    }
}
