//! 工具执行器
//!
//! 持有 ToolRegistry 与统一超时，execute(tool_name, args) 在超时内调用对应工具，
//! 超时或失败时转为 RagError（ToolTimeout / ToolExecutionFailed / UnknownTool）；
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::RagError;
use crate::tools::{ToolDefinition, ToolRegistry};

/// args 预览最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<String, RagError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| RagError::UnknownTool(tool_name.to_string()))?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(RagError::ToolExecutionFailed(e)),
            Err(_) => Err(RagError::ToolTimeout(tool_name.to_string())),
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::tools::{AugmentPromptTool, Tool};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(AugmentPromptTool);
        registry.register(SlowTool);
        ToolExecutor::new(registry, 1)
    }

    #[tokio::test]
    async fn test_execute_ok() {
        let out = executor()
            .execute("augment_prompt", json!({"query": "q", "context": "c"}))
            .await
            .unwrap();
        assert!(out.contains("User Query:\nq"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = executor().execute("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, RagError::UnknownTool(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_tool_error_maps_to_execution_failed() {
        let err = executor()
            .execute("augment_prompt", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ToolExecutionFailed(_)));
    }

    #[tokio::test]
    async fn test_tool_timeout() {
        let err = executor().execute("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, RagError::ToolTimeout(name) if name == "slow"));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({ "text": "x".repeat(500) });
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), ARGS_PREVIEW_CHARS + 3);
    }
}
