//! # taskforge core
//!
//! Domain types, traits, and error definitions shared by every taskforge
//! crate. Nothing here performs I/O; implementations live in their own crates.
//!
//! ## Layout
//!
//! - [`provider`] / [`message`]: the model-provider contract
//! - [`tool`]: the tool contract and the injected [`ToolRegistry`]
//! - [`knowledge`]: knowledge records, trust tiers, and [`KnowledgeStore`]
//! - [`forge`]: candidate tools and the sandbox harness contract
//! - [`execution`]: the request/result pair passed between the assembler,
//!   the execution unit, and the orchestrator

pub mod error;
pub mod execution;
pub mod forge;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AssemblyError, Error, ForgeError, ProviderError, RecordKind, Result, StoreError, ToolError};
pub use execution::{
    ExecutionFailure, ExecutionRequest, ExecutionResult, FailureKind, ResourceUsage, Selection, ToolOutput,
};
pub use forge::{Candidate, ProbeCase, SandboxHarness, Verdict};
pub use knowledge::{
    ApprovedRecord, CapabilityRecord, FactDraft, FactRecord, FormatRecord, KnowledgeSnapshot, KnowledgeStore,
    Lesson, LessonContent, LessonKind, Observation, PatternDraft, PatternRecord, PendingLesson, Provenance,
    StoreStats, ToolImpl, ToolRecord, VerifiedFact,
};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
