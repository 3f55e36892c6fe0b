pub mod config;
pub mod errors;

pub use config::{
    AdapterConfig, ApiConfig, AppConfig, DispatchConfig, ObservabilityConfig,
    SimulatedAdapterConfig, StoreConfig,
};
pub use errors::{DispatchError, DispatchResult};
