//! 通道适配器
//!
//! 每种投递通道（急救车、医院、志愿者、家属短信）对应一个
//! `ChannelAdapter` 实现。HTTP适配器对接真实合作方回调地址，
//! 模拟适配器用于演示和测试。

pub mod factory;
pub mod http;
pub mod simulated;

pub use factory::build_adapters;
pub use http::HttpChannelAdapter;
pub use simulated::SimulatedChannelAdapter;
