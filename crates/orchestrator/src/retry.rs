use std::time::Duration;

use dispatch_core::DispatchConfig;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 每个通道的最大尝试次数
    pub max_attempts: u32,
    /// 基础退避间隔
    pub base_delay: Duration,
    /// 退避间隔上限
    pub max_delay: Duration,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 退避间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_secs(config.backoff_base_seconds),
            max_delay: Duration::from_secs(config.backoff_max_seconds),
            backoff_multiplier: 2.0,
            jitter_factor: config.jitter_factor,
        }
    }

    /// 计算第attempt次尝试失败后的退避等待时间
    ///
    /// 指数退避并限制上限，再添加随机抖动以避免雷群效应。
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1) as i32;

        // 指数退避并限制最大间隔
        let exponential = base * self.backoff_multiplier.powi(exponent);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        // 添加随机抖动
        let jitter = capped * self.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        let final_delay = (capped + jitter).max(0.0);

        Duration::from_secs_f64(final_delay)
    }

    /// 第attempt次尝试失败后是否还有重试预算
    pub fn has_attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
