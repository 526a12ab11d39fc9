//! WebAssembly sandbox for forged tools.
//!
//! Forged tools are WebAssembly modules (text or binary) run under wasmtime
//! with no imports, a fuel budget, a linear-memory cap, and a wall-clock
//! timeout. The same sandbox evaluates candidates and hosts the tools that
//! pass.
//!
//! # Module interface
//!
//! ```wat
//! (memory (export "memory") 1)
//! (func (export "alloc") (param i32) (result i32))
//! (func (export "execute") (param i32 i32) (result i32))
//! ```
//!
//! `execute` receives a pointer and length of the UTF-8 JSON arguments and
//! returns a pointer to a NUL-terminated UTF-8 result string.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use taskforge_config::ForgeConfig;
use taskforge_core::error::{ForgeError, ToolError};
use taskforge_core::forge::{Candidate, SandboxHarness, Verdict};
use taskforge_core::tool::{Tool, ToolResult};
use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, Linker, Module, ResourceLimiter, Store, StoreLimits, StoreLimitsBuilder, Trap};

/// Resource limits applied to every module run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WasmLimits {
    pub fuel: u64,
    pub max_memory_bytes: usize,
    pub timeout: Duration,
}

impl Default for WasmLimits {
    fn default() -> Self {
        Self {
            fuel: 1_000_000,
            max_memory_bytes: 16 * 1024 * 1024,
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ForgeConfig> for WasmLimits {
    fn from(config: &ForgeConfig) -> Self {
        Self {
            fuel: config.fuel_limit,
            max_memory_bytes: config.max_memory_bytes,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Why a single module run failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("fuel exhausted")]
    OutOfFuel,
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("trap: {0}")]
    Trap(String),
    #[error("interface: {0}")]
    Interface(String),
}

fn run_module(engine: &Engine, module: &Module, limits: WasmLimits, input: &str) -> Result<String, RunError> {
    let store_limits = StoreLimitsBuilder::new()
        .memory_size(limits.max_memory_bytes)
        .instances(1)
        .build();
    let mut store: Store<StoreLimits> = Store::new(engine, store_limits);
    store.limiter(|limits| limits as &mut dyn ResourceLimiter);
    store
        .set_fuel(limits.fuel)
        .map_err(|e| RunError::Interface(format!("set fuel: {e}")))?;

    let classify = |e: wasmtime::Error| match e.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => RunError::OutOfFuel,
        _ => RunError::Trap(e.to_string()),
    };

    // No imports: the module cannot reach the host.
    let linker: Linker<StoreLimits> = Linker::new(engine);
    let instance = linker.instantiate(&mut store, module).map_err(classify)?;

    let memory = instance
        .get_memory(&mut store, "memory")
        .ok_or_else(|| RunError::Interface("module must export 'memory'".into()))?;
    let alloc = instance
        .get_typed_func::<i32, i32>(&mut store, "alloc")
        .map_err(|e| RunError::Interface(format!("module must export 'alloc(i32) -> i32': {e}")))?;
    let execute = instance
        .get_typed_func::<(i32, i32), i32>(&mut store, "execute")
        .map_err(|e| RunError::Interface(format!("module must export 'execute(i32, i32) -> i32': {e}")))?;

    let input_bytes = input.as_bytes();
    let input_len = i32::try_from(input_bytes.len()).map_err(|_| RunError::Interface("input too large".into()))?;
    let input_ptr = alloc.call(&mut store, input_len).map_err(classify)?;

    let start = usize::try_from(input_ptr).map_err(|_| RunError::Interface("negative alloc pointer".into()))?;
    let end = start + input_bytes.len();
    {
        let data = memory.data_mut(&mut store);
        if end > data.len() {
            return Err(RunError::Interface("input does not fit in module memory".into()));
        }
        data[start..end].copy_from_slice(input_bytes);
    }

    let result_ptr = execute.call(&mut store, (input_ptr, input_len)).map_err(classify)?;

    let data = memory.data(&store);
    let result_start =
        usize::try_from(result_ptr).map_err(|_| RunError::Interface("negative result pointer".into()))?;
    if result_start >= data.len() {
        return Err(RunError::Interface("result pointer out of bounds".into()));
    }
    let result_end = data[result_start..]
        .iter()
        .position(|&b| b == 0)
        .map(|pos| result_start + pos)
        .unwrap_or(data.len());
    std::str::from_utf8(&data[result_start..result_end])
        .map(str::to_string)
        .map_err(|e| RunError::Interface(format!("result is not UTF-8: {e}")))
}

/// Run on a blocking thread, bounded by the wall-clock timeout.
async fn run_bounded(engine: Engine, module: Module, limits: WasmLimits, input: String) -> Result<String, RunError> {
    let task = tokio::task::spawn_blocking(move || run_module(&engine, &module, limits, &input));
    match tokio::time::timeout(limits.timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(RunError::Trap(format!("sandbox thread failed: {join}"))),
        Err(_) => Err(RunError::TimedOut(limits.timeout)),
    }
}

/// A forged tool hosted in the sandbox.
pub struct WasmTool {
    name: String,
    description: String,
    parameters_schema: serde_json::Value,
    tags: Vec<String>,
    engine: Engine,
    module: Module,
    limits: WasmLimits,
}

impl std::fmt::Debug for WasmTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmTool")
            .field("name", &self.name)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for WasmTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters_schema.clone()
    }

    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }

    /// Forged modules have no host access, so calls never interfere.
    fn ordering_independent(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let input = serde_json::to_string(&arguments)
            .map_err(|e| ToolError::InvalidArguments(format!("Failed to serialize arguments: {e}")))?;
        debug!(name = %self.name, "Executing forged tool");

        match run_bounded(self.engine.clone(), self.module.clone(), self.limits, input).await {
            Ok(output) => Ok(ToolResult::ok(output)),
            Err(RunError::TimedOut(d)) => Err(ToolError::Timeout {
                tool_name: self.name.clone(),
                timeout_secs: d.as_secs(),
            }),
            Err(e) => Err(ToolError::SandboxViolation(format!("{}: {e}", self.name))),
        }
    }
}

/// wasmtime-backed [`SandboxHarness`].
pub struct WasmSandbox {
    engine: Engine,
    limits: WasmLimits,
}

impl WasmSandbox {
    pub fn new(limits: WasmLimits) -> Result<Self, ForgeError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        let engine = Engine::new(&config)
            .map_err(|e| ForgeError::SandboxUnavailable(format!("wasm engine: {e}")))?;
        Ok(Self { engine, limits })
    }

    pub fn limits(&self) -> WasmLimits {
        self.limits
    }

    fn compile(&self, candidate: &Candidate) -> Result<Module, String> {
        Module::new(&self.engine, candidate.module.as_bytes()).map_err(|e| format!("compile: {e}"))
    }
}

#[async_trait]
impl SandboxHarness for WasmSandbox {
    async fn evaluate(&self, candidate: &Candidate) -> Verdict {
        if let Err(e) = candidate.validate() {
            return Verdict::rejected(e.to_string());
        }
        let module = match self.compile(candidate) {
            Ok(module) => module,
            Err(e) => return Verdict::rejected(e),
        };

        let mut failures = Vec::new();
        for (i, probe) in candidate.probes.iter().enumerate() {
            let input = probe.input.to_string();
            match run_bounded(self.engine.clone(), module.clone(), self.limits, input).await {
                Ok(output) if output.contains(&probe.expect_contains) => {}
                Ok(output) => failures.push(format!(
                    "probe {}: output {:?} does not contain {:?}",
                    i + 1,
                    output,
                    probe.expect_contains
                )),
                Err(e) => failures.push(format!("probe {}: {e}", i + 1)),
            }
        }

        let verdict = Verdict::from_failures(failures);
        if verdict.passed {
            info!(name = %candidate.name, probes = candidate.probes.len(), "Candidate passed sandbox evaluation");
        } else {
            warn!(name = %candidate.name, failures = verdict.failures.len(), "Candidate failed sandbox evaluation");
        }
        verdict
    }

    fn instantiate(&self, candidate: &Candidate) -> Result<Arc<dyn Tool>, ForgeError> {
        let module = self.compile(candidate).map_err(|reason| ForgeError::InvalidCandidate {
            name: candidate.name.clone(),
            reason,
        })?;
        Ok(Arc::new(WasmTool {
            name: candidate.name.clone(),
            description: candidate.description.clone(),
            parameters_schema: candidate.parameters_schema.clone(),
            tags: candidate.tags.clone(),
            engine: self.engine.clone(),
            module,
            limits: self.limits,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_core::forge::ProbeCase;

    /// Writes a NUL after the input and returns it: an echo.
    const ECHO_WAT: &str = r#"
        (module
            (memory (export "memory") 1)
            (func (export "alloc") (param i32) (result i32)
                i32.const 1024)
            (func (export "execute") (param $ptr i32) (param $len i32) (result i32)
                (i32.store8 (i32.add (local.get $ptr) (local.get $len)) (i32.const 0))
                local.get $ptr)
        )
    "#;

    const SPIN_WAT: &str = r#"
        (module
            (memory (export "memory") 1)
            (func (export "alloc") (param i32) (result i32)
                i32.const 1024)
            (func (export "execute") (param i32 i32) (result i32)
                (loop $forever (br $forever))
                i32.const 0)
        )
    "#;

    const TRAP_WAT: &str = r#"
        (module
            (memory (export "memory") 1)
            (func (export "alloc") (param i32) (result i32)
                i32.const 1024)
            (func (export "execute") (param i32 i32) (result i32)
                unreachable)
        )
    "#;

    fn candidate(module: &str, expect: &str) -> Candidate {
        Candidate {
            name: "echo_args".into(),
            description: "Echo the arguments".into(),
            parameters_schema: serde_json::json!({"type": "object"}),
            tags: vec!["text".into()],
            module: module.into(),
            probes: vec![ProbeCase {
                input: serde_json::json!({"text": "hello"}),
                expect_contains: expect.into(),
            }],
        }
    }

    fn sandbox() -> WasmSandbox {
        WasmSandbox::new(WasmLimits {
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn passing_candidate() {
        let verdict = sandbox().evaluate(&candidate(ECHO_WAT, "hello")).await;
        assert!(verdict.passed, "{:?}", verdict.failures);
    }

    #[tokio::test]
    async fn mismatched_output_fails() {
        let verdict = sandbox().evaluate(&candidate(ECHO_WAT, "goodbye")).await;
        assert!(!verdict.passed);
        assert!(verdict.failures[0].contains("does not contain"));
    }

    #[tokio::test]
    async fn fuel_exhaustion_fails() {
        let verdict = sandbox().evaluate(&candidate(SPIN_WAT, "x")).await;
        assert!(!verdict.passed);
        assert!(verdict.failures[0].contains("fuel"), "{:?}", verdict.failures);
    }

    #[tokio::test]
    async fn trap_fails() {
        let verdict = sandbox().evaluate(&candidate(TRAP_WAT, "x")).await;
        assert!(!verdict.passed);
        assert!(verdict.failures[0].contains("trap"));
    }

    #[tokio::test]
    async fn invalid_module_rejected() {
        let verdict = sandbox().evaluate(&candidate("(module (func $broken", "x")).await;
        assert!(!verdict.passed);
        assert!(verdict.failures[0].starts_with("compile"));
    }

    #[tokio::test]
    async fn memory_cap_enforced() {
        let sandbox = WasmSandbox::new(WasmLimits {
            max_memory_bytes: 64 * 1024,
            ..Default::default()
        })
        .unwrap();
        // Two pages requested, one allowed.
        let module = ECHO_WAT.replace("(memory (export \"memory\") 1)", "(memory (export \"memory\") 2)");
        let verdict = sandbox.evaluate(&candidate(&module, "hello")).await;
        assert!(!verdict.passed);
    }

    #[tokio::test]
    async fn instantiated_tool_runs() {
        let sandbox = sandbox();
        let tool = sandbox.instantiate(&candidate(ECHO_WAT, "hello")).unwrap();
        assert_eq!(tool.name(), "echo_args");
        assert!(tool.ordering_independent());
        let result = tool.execute(serde_json::json!({"n": 1})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, r#"{"n":1}"#);
    }

    #[tokio::test]
    async fn instantiated_trap_is_sandbox_violation() {
        let tool = sandbox().instantiate(&candidate(TRAP_WAT, "x")).unwrap();
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation(_)));
    }
}
