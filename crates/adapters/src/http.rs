use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::entities::{AckReceipt, AlertPayload, DispatchChannel};
use dispatch_domain::ports::ChannelAdapter;

/// 合作方回执载荷，必须回显会话关联ID
#[derive(Debug, Deserialize)]
struct PartnerAck {
    session_id: Uuid,
    responder_id: Option<String>,
    note: Option<String>,
}

/// HTTP通道适配器
///
/// 将结构化告警以JSON POST到合作方回调地址（108调度、医院接收台、
/// 志愿者网关、短信网关），合作方同步返回确认回执。
/// 传输错误和非2xx响应都按瞬时故障上报，由编排器的重试策略处理。
pub struct HttpChannelAdapter {
    channel: DispatchChannel,
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpChannelAdapter {
    pub fn new(channel: DispatchChannel, endpoint: String) -> Self {
        Self {
            channel,
            endpoint,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for HttpChannelAdapter {
    fn channel(&self) -> DispatchChannel {
        self.channel
    }

    async fn attempt_delivery(&self, alert: &AlertPayload) -> DispatchResult<AckReceipt> {
        debug!(
            "向通道 {} 投递告警: {} -> {}",
            self.channel, alert.session_id, self.endpoint
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(alert)
            .send()
            .await
            .map_err(|e| {
                DispatchError::ChannelDelivery(format!("请求 {} 失败: {e}", self.endpoint))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::ChannelDelivery(format!(
                "通道 {} 返回 {status}: {body}",
                self.channel
            )));
        }

        let ack: PartnerAck = response.json().await.map_err(|e| {
            DispatchError::ChannelDelivery(format!("通道 {} 回执解析失败: {e}", self.channel))
        })?;

        if ack.session_id != alert.session_id {
            return Err(DispatchError::ChannelDelivery(format!(
                "通道 {} 回执的会话ID不匹配: 期望 {}，实际 {}",
                self.channel, alert.session_id, ack.session_id
            )));
        }

        Ok(AckReceipt {
            channel: self.channel,
            responder_id: ack.responder_id,
            received_at: Utc::now(),
            note: ack.note,
        })
    }
}
