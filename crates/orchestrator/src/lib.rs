pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod tracker;

#[cfg(test)]
mod orchestrator_test;
#[cfg(test)]
mod retry_test;
#[cfg(test)]
pub mod test_utils;

pub use orchestrator::{DispatchOrchestrator, OrchestratorSettings};
pub use registry::{ActiveSession, SessionRegistry};
pub use retry::RetryPolicy;
pub use tracker::AcknowledgmentTracker;
