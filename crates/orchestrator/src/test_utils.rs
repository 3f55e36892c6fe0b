use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::entities::{
    AckReceipt, AlertPayload, DispatchChannel, Location, TriageResult,
};
use dispatch_domain::ports::ChannelAdapter;

use crate::retry::RetryPolicy;
use crate::OrchestratorSettings;

/// 脚本化的适配器行为
#[derive(Debug, Clone, Copy)]
pub enum ScriptedBehavior {
    /// 延迟指定时间后确认
    AckAfter(Duration),
    /// 前N次尝试失败，之后确认
    FailTimes(u32),
    /// 每次尝试都失败
    AlwaysFail,
    /// 永不返回（只能被超时或取消打断）
    Hang,
}

/// 按脚本行为响应的通道适配器，记录每次尝试的开始时刻
pub struct ScriptedAdapter {
    channel: DispatchChannel,
    behavior: ScriptedBehavior,
    attempts: AtomicU32,
    starts: Mutex<Vec<Instant>>,
    completions: Mutex<Vec<Instant>>,
}

impl ScriptedAdapter {
    pub fn new(channel: DispatchChannel, behavior: ScriptedBehavior) -> Arc<Self> {
        Arc::new(Self {
            channel,
            behavior,
            attempts: AtomicU32::new(0),
            starts: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
        })
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn attempt_starts(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<Instant> {
        self.completions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedAdapter {
    fn channel(&self) -> DispatchChannel {
        self.channel
    }

    async fn attempt_delivery(&self, _alert: &AlertPayload) -> DispatchResult<AckReceipt> {
        self.starts.lock().unwrap().push(Instant::now());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let result = match self.behavior {
            ScriptedBehavior::AckAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ack_receipt(self.channel))
            }
            ScriptedBehavior::FailTimes(failures) => {
                if attempt <= failures {
                    Err(DispatchError::ChannelDelivery(format!(
                        "脚本失败 {attempt}/{failures}"
                    )))
                } else {
                    Ok(ack_receipt(self.channel))
                }
            }
            ScriptedBehavior::AlwaysFail => Err(DispatchError::ChannelDelivery(
                "通道持续拒绝投递".to_string(),
            )),
            ScriptedBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DispatchError::ChannelDelivery("不可达".to_string()))
            }
        };

        self.completions.lock().unwrap().push(Instant::now());
        result
    }
}

pub fn ack_receipt(channel: DispatchChannel) -> AckReceipt {
    AckReceipt {
        channel,
        responder_id: Some(format!("responder-{channel}")),
        received_at: chrono::Utc::now(),
        note: None,
    }
}

pub fn test_triage() -> TriageResult {
    TriageResult {
        classification: "cardiac".to_string(),
        severity: "critical".to_string(),
        required_capability: Some("cath_lab".to_string()),
        recommended_facilities: vec!["Jayadeva Institute".to_string()],
    }
}

pub fn test_location() -> Location {
    Location {
        latitude: 12.9716,
        longitude: 77.5946,
        address: Some("Bengaluru".to_string()),
    }
}

/// 面向测试的快速参数：毫秒级超时与退避，无抖动
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        attempt_timeout: Duration::from_millis(50),
        session_deadline: Duration::from_secs(5),
        registry_retention: Duration::from_millis(200),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        },
        escalation_enabled: false,
    }
}
