//! Built-in demo tools for `toolflow run`.
//!
//! These stand in for real analysis tools so workflow files can be executed
//! end-to-end from the command line.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use tools::{
    ExecutableTool, ParamKind, ParamSpec, ToolContext, ToolDescriptor, ToolError, ToolRegistry,
};

/// Returns its input unchanged under a `result` field.
struct EchoTool;

#[async_trait]
impl ExecutableTool for EchoTool {
    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        ctx.progress.report(100);
        Ok(json!({ "result": input }))
    }
}

/// Sleeps for `duration_ms`, reporting progress along the way.
struct DelayTool;

#[async_trait]
impl ExecutableTool for DelayTool {
    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let total_ms = input
            .get("duration_ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| ToolError::Fatal("duration_ms must be a number".into()))?;

        let slice = Duration::from_millis((total_ms / 10).max(1));
        for tick in 1..=10u8 {
            if ctx.is_cancelled() {
                return Err(ToolError::Fatal("cancelled".into()));
            }
            tokio::time::sleep(slice).await;
            ctx.progress.report(tick * 10);
        }
        Ok(json!({ "slept_ms": total_ms }))
    }
}

/// Always fails; `retryable` in the input picks the error class.
struct FailTool;

#[async_trait]
impl ExecutableTool for FailTool {
    async fn run(&self, input: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let message = input
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("demo failure")
            .to_string();
        if input.get("retryable").and_then(Value::as_bool).unwrap_or(false) {
            Err(ToolError::Retryable(message))
        } else {
            Err(ToolError::Fatal(message))
        }
    }
}

/// Registry with every demo tool registered.
pub fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolDescriptor::new("echo", "Echo", "demo:echo").with_output("result"),
        Arc::new(EchoTool),
    );
    registry.register(
        ToolDescriptor::new("delay", "Delay", "demo:delay")
            .with_input(ParamSpec::required("duration_ms", ParamKind::Number))
            .with_output("slept_ms"),
        Arc::new(DelayTool),
    );
    registry.register(
        ToolDescriptor::new("fail", "Fail", "demo:fail")
            .with_input(ParamSpec::optional("message", ParamKind::String))
            .with_input(ParamSpec::optional("retryable", ParamKind::Boolean)),
        Arc::new(FailTool),
    );

    registry
}
