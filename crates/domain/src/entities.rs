use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 应急投递通道
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DispatchChannel {
    /// 108急救车官方系统
    #[serde(rename = "ambulance")]
    Ambulance,
    /// 推荐医院
    #[serde(rename = "hospital")]
    Hospital,
    /// 附近注册志愿者
    #[serde(rename = "volunteer")]
    Volunteer,
    /// 紧急联系人位置短信
    #[serde(rename = "family_sms")]
    FamilySms,
}

impl DispatchChannel {
    pub const ALL: [DispatchChannel; 4] = [
        DispatchChannel::Ambulance,
        DispatchChannel::Hospital,
        DispatchChannel::Volunteer,
        DispatchChannel::FamilySms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchChannel::Ambulance => "ambulance",
            DispatchChannel::Hospital => "hospital",
            DispatchChannel::Volunteer => "volunteer",
            DispatchChannel::FamilySms => "family_sms",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ambulance" => Some(DispatchChannel::Ambulance),
            "hospital" => Some(DispatchChannel::Hospital),
            "volunteer" => Some(DispatchChannel::Volunteer),
            "family_sms" => Some(DispatchChannel::FamilySms),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 单个通道的投递状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_FLIGHT")]
    InFlight,
    #[serde(rename = "ACKNOWLEDGED")]
    Acknowledged,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "TIMED_OUT")]
    TimedOut,
    #[serde(rename = "EXHAUSTED")]
    Exhausted,
}

impl ChannelStatus {
    /// 终态不允许任何后续迁移
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelStatus::Acknowledged | ChannelStatus::TimedOut | ChannelStatus::Exhausted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Pending => "PENDING",
            ChannelStatus::InFlight => "IN_FLIGHT",
            ChannelStatus::Acknowledged => "ACKNOWLEDGED",
            ChannelStatus::Failed => "FAILED",
            ChannelStatus::TimedOut => "TIMED_OUT",
            ChannelStatus::Exhausted => "EXHAUSTED",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 会话级聚合状态，在每次通道状态变更后重新推导
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverallStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PARTIAL")]
    Partial,
    #[serde(rename = "ACKNOWLEDGED")]
    Acknowledged,
    #[serde(rename = "FAILED")]
    Failed,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Pending => "PENDING",
            OverallStatus::Partial => "PARTIAL",
            OverallStatus::Acknowledged => "ACKNOWLEDGED",
            OverallStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// 通道状态记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel: DispatchChannel,
    pub status: ChannelStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl ChannelState {
    pub fn new(channel: DispatchChannel) -> Self {
        Self {
            channel,
            status: ChannelStatus::Pending,
            attempt_count: 0,
            last_error: None,
            acknowledged_at: None,
        }
    }
}

/// 外部分诊结果，编排器将其视为不透明输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    pub classification: String,
    pub severity: String,
    pub required_capability: Option<String>,
    #[serde(default)]
    pub recommended_facilities: Vec<String>,
}

/// 地理位置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

/// 调度会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSession {
    pub session_id: Uuid,
    pub triage_result: TriageResult,
    pub location: Location,
    pub channel_states: HashMap<DispatchChannel, ChannelState>,
    pub overall_status: OverallStatus,
    pub created_at: DateTime<Utc>,
    pub sealed_at: Option<DateTime<Utc>>,
}

impl DispatchSession {
    /// 创建新会话，所有配置通道初始为PENDING。
    /// 通道集合在会话生命周期内不再增减。
    pub fn new(triage_result: TriageResult, location: Location, channels: &[DispatchChannel]) -> Self {
        let channel_states = channels
            .iter()
            .map(|&channel| (channel, ChannelState::new(channel)))
            .collect();

        Self {
            session_id: Uuid::new_v4(),
            triage_result,
            location,
            channel_states,
            overall_status: OverallStatus::Pending,
            created_at: Utc::now(),
            sealed_at: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed_at.is_some()
    }

    pub fn channel_state(&self, channel: DispatchChannel) -> Option<&ChannelState> {
        self.channel_states.get(&channel)
    }

    /// 所有通道均到达终态
    pub fn all_terminal(&self) -> bool {
        self.channel_states
            .values()
            .all(|state| state.status.is_terminal())
    }

    pub fn acknowledged_count(&self) -> usize {
        self.channel_states
            .values()
            .filter(|state| state.status == ChannelStatus::Acknowledged)
            .count()
    }

    /// 重新推导聚合状态:
    /// - 全部确认 => ACKNOWLEDGED
    /// - 全部终态且无确认 => FAILED
    /// - 至少一个确认且并非全部确认 => PARTIAL
    /// - 其余情况 => PENDING
    pub fn recompute_overall(&mut self) {
        let total = self.channel_states.len();
        let acknowledged = self.acknowledged_count();

        self.overall_status = if acknowledged == total {
            OverallStatus::Acknowledged
        } else if acknowledged > 0 {
            OverallStatus::Partial
        } else if self.all_terminal() {
            OverallStatus::Failed
        } else {
            OverallStatus::Pending
        };
    }
}

/// 发往通道适配器的结构化告警载荷，合作方在确认中回显会话关联ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub session_id: Uuid,
    pub channel: DispatchChannel,
    pub classification: String,
    pub severity: String,
    pub location: Location,
    pub required_capability: Option<String>,
    #[serde(default)]
    pub recommended_facilities: Vec<String>,
}

impl AlertPayload {
    pub fn for_channel(session: &DispatchSession, channel: DispatchChannel) -> Self {
        Self {
            session_id: session.session_id,
            channel,
            classification: session.triage_result.classification.clone(),
            severity: session.triage_result.severity.clone(),
            location: session.location.clone(),
            required_capability: session.triage_result.required_capability.clone(),
            recommended_facilities: session.triage_result.recommended_facilities.clone(),
        }
    }
}

/// 通道确认回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckReceipt {
    pub channel: DispatchChannel,
    pub responder_id: Option<String>,
    pub received_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl AckReceipt {
    pub fn new(channel: DispatchChannel) -> Self {
        Self {
            channel,
            responder_id: None,
            received_at: Utc::now(),
            note: None,
        }
    }
}
