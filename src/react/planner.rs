//! LLM 决策协作者
//!
//! 把 system prompt、工具目录、先前对话、用户请求与 transcript 拼成消息序列交给 LLM；
//! parse_decision 从回复中提取第一个 JSON 对象并解析为 Decision。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{preview, AgentError, TranscriptEntry};
use crate::llm::{LlmClient, Message};
use crate::react::{Decision, DecisionClient, DecisionContext};
use crate::tools::decision_schema_json;

/// 默认 system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a job-market analyst. Answer questions about skill and job-role demand \
using ONLY the numbers returned by the tools. Call one tool per step. When the evidence is sufficient, finalize with \
status \"completed\" and a payload containing reasoning, confidence_score (0..1), criteria_used, strengths and weaknesses. \
If the user must clarify (e.g. no skills or roles named), finalize with \"input_required\" and required_fields. \
For personal job recommendations call recommend_jobs; if it reports missing fields, finalize with \"input_required\". \
If the data cannot answer the question, finalize with \"failed\".";

/// Observation 渲染给 LLM 时的最大字符数
const OBSERVATION_CHARS: usize = 2000;

/// 从 LLM 输出解析 Decision
///
/// - ```json 代码块或正文中的第一个 JSON 对象
/// - 兼容 {"tool": "...", "args": {...}} 的简写形式
/// - 没有 JSON 时视为 finalize(completed)，整段文本作为 reasoning
pub fn parse_decision(output: &str) -> Result<Decision, AgentError> {
    let trimmed = output.trim();

    let body = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let Some(start) = trimmed.find('{') {
        &trimmed[start..]
    } else {
        return Ok(Decision::finalize("completed", json!({ "reasoning": trimmed })));
    };

    let value: Value = serde_json::Deserializer::from_str(body)
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| AgentError::DecisionFailed("empty decision".to_string()))?
        .map_err(|e| AgentError::DecisionFailed(format!("{}: {}", e, preview(body, 200))))?;

    if value.get("action").is_none() {
        if let Some(tool) = value.get("tool").and_then(Value::as_str) {
            let arguments = value.get("args").cloned().unwrap_or_else(|| json!({}));
            return Ok(Decision::call(tool, arguments));
        }
    }

    serde_json::from_value(value)
        .map_err(|e| AgentError::DecisionFailed(format!("unrecognized decision: {e}")))
}

pub struct PlannerDecisionClient {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl PlannerDecisionClient {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self::with_system_prompt(llm, DEFAULT_SYSTEM_PROMPT)
    }

    pub fn with_system_prompt(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 拼装本步的完整消息序列
    pub fn build_messages(&self, ctx: &DecisionContext<'_>) -> Vec<Message> {
        let catalog = serde_json::to_string_pretty(ctx.catalog).unwrap_or_else(|_| "[]".to_string());
        let system = format!(
            "{}\n\nAvailable tools:\n{}\n\nReply with exactly one JSON object matching this schema:\n{}\n\nRemaining tool calls: {}",
            self.system_prompt,
            catalog,
            decision_schema_json(),
            ctx.budget_remaining
        );

        let mut messages = vec![Message::system(system)];
        messages.extend(ctx.prior_context.iter().cloned());
        messages.push(Message::user(ctx.request.to_string()));

        for entry in ctx.transcript {
            match entry {
                TranscriptEntry::Tool { call, result } => {
                    messages.push(Message::assistant(
                        json!({
                            "action": "call_tool",
                            "name": call.name,
                            "arguments": call.arguments,
                        })
                        .to_string(),
                    ));
                    messages.push(Message::tool(format!(
                        "Observation #{} from {}: {}",
                        call.sequence_number,
                        call.name,
                        preview(&result.output.to_string(), OBSERVATION_CHARS)
                    )));
                }
                TranscriptEntry::Note { step, message } => {
                    messages.push(Message::user(format!("[step {step}] {message}")));
                }
            }
        }
        messages
    }
}

#[async_trait]
impl DecisionClient for PlannerDecisionClient {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Decision, AgentError> {
        let messages = self.build_messages(ctx);
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::DecisionFailed)?;
        tracing::debug!(reply = %preview(&output, 300), "decision reply");
        parse_decision(&output)
    }
}
