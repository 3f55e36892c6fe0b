use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use dispatch_core::config::AdapterConfig;
use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::entities::DispatchChannel;
use dispatch_domain::ports::ChannelAdapter;

use crate::http::HttpChannelAdapter;
use crate::simulated::SimulatedChannelAdapter;

/// 按配置为每个通道构建适配器
///
/// http模式要求每个通道都配置了回调地址，缺失视为配置错误而不是
/// 运行时降级，启动阶段即失败。
pub fn build_adapters(
    config: &AdapterConfig,
    channels: &[DispatchChannel],
) -> DispatchResult<HashMap<DispatchChannel, Arc<dyn ChannelAdapter>>> {
    let mut adapters: HashMap<DispatchChannel, Arc<dyn ChannelAdapter>> = HashMap::new();

    match config.mode.as_str() {
        "simulated" => {
            let latency = Duration::from_millis(config.simulated.ack_latency_ms);
            for &channel in channels {
                adapters.insert(
                    channel,
                    Arc::new(SimulatedChannelAdapter::new(
                        channel,
                        latency,
                        config.simulated.failure_rate,
                    )),
                );
            }
            info!(
                "已构建 {} 个模拟通道适配器 (延迟: {}ms, 失败率: {})",
                adapters.len(),
                config.simulated.ack_latency_ms,
                config.simulated.failure_rate
            );
        }
        "http" => {
            for &channel in channels {
                let endpoint = config.endpoints.get(channel.as_str()).ok_or_else(|| {
                    DispatchError::Configuration(format!(
                        "http模式下缺少通道 {} 的回调地址配置",
                        channel
                    ))
                })?;
                adapters.insert(
                    channel,
                    Arc::new(HttpChannelAdapter::new(channel, endpoint.clone())),
                );
            }
            info!("已构建 {} 个HTTP通道适配器", adapters.len());
        }
        other => {
            return Err(DispatchError::Configuration(format!(
                "未知的适配器模式: {other}"
            )));
        }
    }

    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::config::SimulatedAdapterConfig;

    #[test]
    fn test_build_simulated_adapters_for_all_channels() {
        let config = AdapterConfig::default();
        let adapters = build_adapters(&config, &DispatchChannel::ALL).unwrap();
        assert_eq!(adapters.len(), 4);
        for channel in DispatchChannel::ALL {
            assert_eq!(adapters[&channel].channel(), channel);
        }
    }

    #[test]
    fn test_build_http_adapters_requires_endpoints() {
        let mut config = AdapterConfig {
            mode: "http".to_string(),
            endpoints: HashMap::new(),
            simulated: SimulatedAdapterConfig::default(),
        };
        config.endpoints.insert(
            "ambulance".to_string(),
            "http://localhost:9001/alerts".to_string(),
        );

        let result = build_adapters(&config, &[DispatchChannel::Ambulance]);
        assert!(result.is_ok());

        let result = build_adapters(
            &config,
            &[DispatchChannel::Ambulance, DispatchChannel::Hospital],
        );
        assert!(matches!(result, Err(DispatchError::Configuration(_))));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let config = AdapterConfig {
            mode: "carrier_pigeon".to_string(),
            ..AdapterConfig::default()
        };
        let result = build_adapters(&config, &[DispatchChannel::FamilySms]);
        assert!(matches!(result, Err(DispatchError::Configuration(_))));
    }
}
