//! 循环过程事件：用于流式展示思考、工具调用、观察与最终状态

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// 第几个 Thinking 步骤、剩余预算
    StepUpdate { step: usize, budget_remaining: usize },
    /// 正在请求决策协作者
    Thinking,
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
        sequence_number: usize,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 工具返回错误结果（仍进入 transcript）
    ToolFailure { tool: String, reason: String },
    /// 决策失败后的恢复动作
    Recovery { action: String, detail: String },
    /// 预算耗尽，强制 Finalizing
    BudgetExhausted { tool_calls: usize },
    /// 最终状态
    Finalized { status: String },
}
