//! The taskforge agent: orchestration, isolated execution, and learning.
//!
//! One objective flows through:
//!
//! 1. **Route**: conversational objectives get a direct reply
//! 2. **Select**: the planner picks tools, facts, and a format from compact indices
//! 3. **Assemble**: the selection resolves into an [`ExecutionRequest`](taskforge_core::execution::ExecutionRequest)
//! 4. **Execute**: a fresh [`ExecutionUnit`] runs with only the selected tools
//! 5. **Learn**: capability counters always; verified facts and queued
//!    lessons only after success
//!
//! Failed attempts retry with the previous error, up to three times, before
//! the circuit breaks.

pub mod assembler;
pub mod calibrator;
pub mod executor;
pub mod forge;
pub mod json;
pub mod learning;
pub mod mission;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod stagnation;

#[cfg(test)]
mod test_helpers;

pub use assembler::assemble;
pub use calibrator::ErrorClassifier;
pub use executor::{ExecutionSettings, ExecutionUnit};
pub use forge::{CandidateGenerator, CapabilityForge, ForgeOutcome, ModelCandidateGenerator, rehydrate};
pub use mission::{EdgeKind, MissionNode, MissionTree, NodeStatus};
pub use orchestrator::{CircuitBroken, Orchestrator, OrchestratorError, OrchestratorSettings, Outcome, TaskReport};
pub use planner::{Planner, PlannerSettings, Route};
pub use stagnation::StagnationDetector;
