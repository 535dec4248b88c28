//! 工具执行器
//!
//! 持有共享的 ToolRegistry、单次调用超时与并发许可。execute(tool_name, args) 取得许可后在超时内
//! 交给 ToolRegistry::invoke（解析、校验、调用）；所有失败都转成 ToolResult，每次调用输出一条结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{preview, AgentError, ErrorCode, TaskScheduler};
use crate::tools::{ToolRegistry, ToolResult, ToolSpec};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    scheduler: TaskScheduler,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self::with_scheduler(registry, timeout_secs, TaskScheduler::default())
    }

    pub fn with_scheduler(
        registry: Arc<ToolRegistry>,
        timeout_secs: u64,
        scheduler: TaskScheduler,
    ) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            scheduler,
        }
    }

    /// 用毫秒级超时构造（测试慢工具时使用）
    pub fn with_timeout(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            scheduler: TaskScheduler::default(),
        }
    }

    /// 执行指定工具：未知工具或参数不合法记为 rejected，超时记为 timeout，均不终止调用方
    pub async fn execute(&self, tool_name: &str, args: Value) -> ToolResult {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let (result, outcome) = match self.scheduler.acquire_tool().await {
            Err(e) => (ToolResult::from_error(&e), "error"),
            Ok(_permit) => match timeout(self.timeout, self.registry.invoke(tool_name, args)).await {
                Ok(result) => {
                    let outcome = audit_outcome(&result);
                    (result, outcome)
                }
                Err(_) => (
                    ToolResult::from_error(&AgentError::ToolTimeout(tool_name.to_string())),
                    "timeout",
                ),
            },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.registry.catalog()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    preview(&args.to_string(), 200)
}

/// 审计日志里的 outcome：参数或工具名被拒为 rejected
fn audit_outcome(result: &ToolResult) -> &'static str {
    if !result.is_error() {
        "ok"
    } else if result.error_code == Some(ErrorCode::InvalidInputFormat) {
        "rejected"
    } else {
        "error"
    }
}
