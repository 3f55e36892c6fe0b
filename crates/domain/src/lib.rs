pub mod entities;
pub mod ports;
pub mod repositories;

pub use entities::{
    AckReceipt, AlertPayload, ChannelState, ChannelStatus, DispatchChannel, DispatchSession,
    Location, OverallStatus, TriageResult,
};
pub use ports::ChannelAdapter;
pub use repositories::SessionStore;
