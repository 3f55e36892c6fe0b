use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;

use dispatch_adapters::{build_adapters, SimulatedChannelAdapter};
use dispatch_api::{create_app, AppState};
use dispatch_core::AppConfig;
use dispatch_domain::entities::DispatchChannel;
use dispatch_domain::ports::ChannelAdapter;
use dispatch_domain::repositories::SessionStore;
use dispatch_infrastructure::{InMemorySessionStore, SqliteSessionStore};
use dispatch_orchestrator::{DispatchOrchestrator, OrchestratorSettings};

/// 应用实例
///
/// 按配置组装存储后端、通道适配器和编排器，并运行HTTP服务。
pub struct Application {
    config: AppConfig,
    orchestrator: Arc<DispatchOrchestrator>,
    default_channels: Vec<DispatchChannel>,
}

impl Application {
    /// 创建应用实例
    ///
    /// embedded模式忽略配置中的存储与适配器设置，使用内存存储和
    /// 模拟适配器，便于零配置本地演示。
    pub async fn new(config: AppConfig, embedded: bool) -> Result<Self> {
        let default_channels = parse_default_channels(&config.dispatch.default_channels)?;

        let store: Arc<dyn SessionStore> = if embedded {
            info!("嵌入式模式: 使用内存会话存储");
            Arc::new(InMemorySessionStore::new())
        } else {
            match config.store.backend.as_str() {
                "memory" => {
                    info!("使用内存会话存储");
                    Arc::new(InMemorySessionStore::new())
                }
                "sqlite" => {
                    info!("使用SQLite会话存储: {}", config.store.sqlite_path);
                    Arc::new(
                        SqliteSessionStore::new_embedded(&config.store.sqlite_path)
                            .await
                            .context("初始化SQLite会话存储失败")?,
                    )
                }
                other => {
                    return Err(anyhow::anyhow!("不支持的存储后端: {other}"));
                }
            }
        };

        let adapters = if embedded {
            info!("嵌入式模式: 使用模拟通道适配器");
            let mut adapters: HashMap<DispatchChannel, Arc<dyn ChannelAdapter>> = HashMap::new();
            for &channel in &default_channels {
                adapters.insert(
                    channel,
                    Arc::new(SimulatedChannelAdapter::new(
                        channel,
                        Duration::from_millis(config.adapters.simulated.ack_latency_ms),
                        config.adapters.simulated.failure_rate,
                    )),
                );
            }
            adapters
        } else {
            build_adapters(&config.adapters, &default_channels).context("构建通道适配器失败")?
        };

        let settings = OrchestratorSettings::from_config(&config.dispatch);
        let orchestrator = Arc::new(DispatchOrchestrator::new(adapters, store, settings));

        Ok(Self {
            config,
            orchestrator,
            default_channels,
        })
    }

    /// 运行HTTP服务直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let state = AppState {
            orchestrator: Arc::clone(&self.orchestrator),
            default_channels: self.default_channels.clone(),
        };
        let app = create_app(state, self.config.api.cors_enabled);

        let listener = tokio::net::TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;

        info!("HTTP服务已启动: http://{}", self.config.api.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP服务收到关闭信号");
            })
            .await
            .context("HTTP服务运行失败")?;

        info!("HTTP服务已停止");
        Ok(())
    }
}

fn parse_default_channels(names: &[String]) -> Result<Vec<DispatchChannel>> {
    let channels: Vec<DispatchChannel> = names
        .iter()
        .map(|name| {
            DispatchChannel::parse(name)
                .ok_or_else(|| anyhow::anyhow!("配置中存在未知通道: {name}"))
        })
        .collect::<Result<_>>()?;

    if channels.is_empty() {
        return Err(anyhow::anyhow!("默认通道集合不能为空"));
    }

    Ok(channels)
}
