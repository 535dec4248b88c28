//! 决策协作者接口
//!
//! 每个 Thinking 步骤，循环把请求、transcript 与工具目录交给 DecisionClient，
//! 得到 call_tool 或 finalize 两种动作之一。LLM 与脚本策略都实现同一个 trait。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AgentError, TranscriptEntry};
use crate::llm::Message;
use crate::tools::ToolSpec;

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// 决策协作者的输出
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    CallTool {
        name: String,
        #[serde(default = "empty_object", alias = "args")]
        arguments: Value,
    },
    Finalize {
        #[serde(default)]
        status: Option<String>,
        #[serde(default, alias = "payload_draft")]
        payload: Value,
    },
}

impl Decision {
    pub fn call(name: impl Into<String>, arguments: Value) -> Self {
        Decision::CallTool {
            name: name.into(),
            arguments,
        }
    }

    pub fn finalize(status: impl Into<String>, payload: Value) -> Self {
        Decision::Finalize {
            status: Some(status.into()),
            payload,
        }
    }
}

/// 一次 Thinking 步骤可见的全部信息
#[derive(Clone, Copy, Debug)]
pub struct DecisionContext<'a> {
    pub request: &'a str,
    pub prior_context: &'a [Message],
    pub transcript: &'a [TranscriptEntry],
    pub catalog: &'a [ToolSpec],
    pub budget_remaining: usize,
}

#[async_trait]
pub trait DecisionClient: Send + Sync {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Decision, AgentError>;
}

/// 预置决策序列（测试与 CLI 使用）；序列用完后重复 fallback，没有 fallback 则返回 DecisionFailed
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    script: Mutex<VecDeque<Decision>>,
    fallback: Option<Decision>,
}

impl ScriptedDecisions {
    pub fn new(script: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
        }
    }

    /// 永远返回同一个决策
    pub fn repeating(decision: Decision) -> Self {
        Self::new(Vec::new()).then_repeat(decision)
    }

    pub fn then_repeat(mut self, decision: Decision) -> Self {
        self.fallback = Some(decision);
        self
    }
}

#[async_trait]
impl DecisionClient for ScriptedDecisions {
    async fn decide(&self, _ctx: &DecisionContext<'_>) -> Result<Decision, AgentError> {
        let next = self
            .script
            .lock()
            .map_err(|_| AgentError::DecisionFailed("decision script poisoned".to_string()))?
            .pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or_else(|| AgentError::DecisionFailed("no scripted decision left".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_wire_format() {
        let call: Decision = serde_json::from_value(json!({
            "action": "call_tool",
            "name": "top_skills",
            "arguments": {"window": "3m"}
        }))
        .unwrap();
        assert_eq!(call, Decision::call("top_skills", json!({"window": "3m"})));

        let fin: Decision = serde_json::from_value(json!({
            "action": "finalize",
            "status": "completed",
            "payload_draft": {"reasoning": "ok"}
        }))
        .unwrap();
        assert_eq!(fin, Decision::finalize("completed", json!({"reasoning": "ok"})));
    }

    #[test]
    fn test_missing_arguments_default_to_empty_object() {
        let call: Decision =
            serde_json::from_value(json!({"action": "call_tool", "name": "top_skills"})).unwrap();
        assert_eq!(call, Decision::call("top_skills", json!({})));
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let client = ScriptedDecisions::new([Decision::call("a", json!({}))])
            .then_repeat(Decision::finalize("completed", Value::Null));
        let ctx = DecisionContext {
            request: "q",
            prior_context: &[],
            transcript: &[],
            catalog: &[],
            budget_remaining: 3,
        };
        assert_eq!(client.decide(&ctx).await.unwrap(), Decision::call("a", json!({})));
        assert!(matches!(client.decide(&ctx).await.unwrap(), Decision::Finalize { .. }));
        assert!(ScriptedDecisions::default().decide(&ctx).await.is_err());
    }
}
