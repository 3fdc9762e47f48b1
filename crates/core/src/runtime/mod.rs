mod agent;
mod loop_control;
mod shutdown;

pub use agent::{Agent, AgentParts, StepOutcome};
pub use loop_control::{backoff_delay, pause};
pub use shutdown::ShutdownGuard;
pub use crate::types::AgentStatus;
