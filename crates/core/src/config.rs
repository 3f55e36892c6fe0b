use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub adapters: AdapterConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// API服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
    pub cors_enabled: bool,
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
            request_timeout_seconds: 30,
        }
    }
}

/// 调度策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 单次通道投递的超时时间（秒）
    pub attempt_timeout_seconds: u64,
    /// 每个通道的最大尝试次数
    pub max_attempts: u32,
    /// 重试退避基础间隔（秒）
    pub backoff_base_seconds: u64,
    /// 重试退避间隔上限（秒）
    pub backoff_max_seconds: u64,
    /// 退避间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
    /// 会话级截止时间（秒），到期后所有未终态通道标记为超时
    pub session_deadline_seconds: u64,
    /// 会话封存后在活跃注册表中的保留时间（秒）
    pub registry_retention_seconds: u64,
    /// 默认启用的投递通道
    pub default_channels: Vec<String>,
    /// 部分确认时是否触发升级策略（预留开关，默认关闭）
    pub escalation_enabled: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_seconds: 10,
            max_attempts: 3,
            backoff_base_seconds: 2,
            backoff_max_seconds: 30,
            jitter_factor: 0.2,
            session_deadline_seconds: 120,
            registry_retention_seconds: 300,
            default_channels: vec![
                "ambulance".to_string(),
                "hospital".to_string(),
                "volunteer".to_string(),
                "family_sms".to_string(),
            ],
            escalation_enabled: false,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.attempt_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("通道投递超时必须大于0"));
        }

        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("最大尝试次数必须大于0"));
        }

        if self.backoff_base_seconds == 0 {
            return Err(anyhow::anyhow!("退避基础间隔必须大于0"));
        }

        if self.backoff_max_seconds < self.backoff_base_seconds {
            return Err(anyhow::anyhow!("退避间隔上限不能小于基础间隔"));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(anyhow::anyhow!(
                "抖动系数必须在0.0-1.0之间: {}",
                self.jitter_factor
            ));
        }

        if self.session_deadline_seconds == 0 {
            return Err(anyhow::anyhow!("会话截止时间必须大于0"));
        }

        if self.default_channels.is_empty() {
            return Err(anyhow::anyhow!("默认通道集合不能为空"));
        }

        Ok(())
    }
}

/// 通道适配器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// 适配器模式: "simulated" 或 "http"
    pub mode: String,
    /// http模式下各通道的合作方回调地址，键为通道名
    pub endpoints: HashMap<String, String>,
    pub simulated: SimulatedAdapterConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            mode: "simulated".to_string(),
            endpoints: HashMap::new(),
            simulated: SimulatedAdapterConfig::default(),
        }
    }
}

impl AdapterConfig {
    pub fn validate(&self, channels: &[String]) -> Result<()> {
        let valid_modes = ["simulated", "http"];
        if !valid_modes.contains(&self.mode.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的适配器模式: {}，支持的模式: {:?}",
                self.mode,
                valid_modes
            ));
        }

        if self.mode == "http" {
            for channel in channels {
                if !self.endpoints.contains_key(channel) {
                    return Err(anyhow::anyhow!("通道 {} 缺少回调地址配置", channel));
                }
            }
        }

        self.simulated.validate()?;

        Ok(())
    }
}

/// 模拟适配器配置，用于内嵌模式和演示
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedAdapterConfig {
    /// 模拟确认延迟（毫秒）
    pub ack_latency_ms: u64,
    /// 模拟投递失败率（0.0-1.0）
    pub failure_rate: f64,
}

impl Default for SimulatedAdapterConfig {
    fn default() -> Self {
        Self {
            ack_latency_ms: 50,
            failure_rate: 0.0,
        }
    }
}

impl SimulatedAdapterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(anyhow::anyhow!(
                "模拟失败率必须在0.0-1.0之间: {}",
                self.failure_rate
            ));
        }

        Ok(())
    }
}

/// 会话存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 存储后端: "memory" 或 "sqlite"
    pub backend: String,
    /// sqlite数据库文件路径
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            sqlite_path: "dispatch.db".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        let valid_backends = ["memory", "sqlite"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的存储后端: {}，支持的后端: {:?}",
                self.backend,
                valid_backends
            ));
        }

        if self.backend == "sqlite" && self.sqlite_path.is_empty() {
            return Err(anyhow::anyhow!("sqlite数据库路径不能为空"));
        }

        Ok(())
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序:
    /// 1. 内置默认值
    /// 2. TOML配置文件
    /// 3. 环境变量覆盖（前缀: DISPATCH_，层级分隔符: __）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/dispatch.toml",
                "dispatch.toml",
                "/etc/dispatch/config.toml",
            ];

            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DISPATCH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("构建配置失败")?;
        let app_config: AppConfig = config.try_deserialize().context("解析配置失败")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// 校验所有配置段
    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate().context("调度配置无效")?;
        self.adapters
            .validate(&self.dispatch.default_channels)
            .context("适配器配置无效")?;
        self.store.validate().context("存储配置无效")?;

        if self.api.bind_address.is_empty() {
            return Err(anyhow::anyhow!("API监听地址不能为空"));
        }

        Ok(())
    }
}
