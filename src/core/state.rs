//! 单次请求的循环状态：阶段、预算、Transcript
//!
//! LoopState 由 OrchestrationLoop 独占，请求结束即丢弃；跨请求只通过调用方显式传入的 prior_context 延续。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::Message;
use crate::tools::ToolResult;

/// 循环阶段：Thinking -> Acting -> Observing -> {Thinking | Finalizing} -> Terminated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Thinking,
    Acting,
    Observing,
    Finalizing,
    Terminated,
}

impl LoopPhase {
    /// 合法迁移；Thinking -> Thinking 对应决策失败后的重试
    pub fn can_advance_to(self, next: LoopPhase) -> bool {
        use LoopPhase::*;
        matches!(
            (self, next),
            (Thinking, Thinking | Acting | Finalizing)
                | (Acting, Observing | Finalizing)
                | (Observing, Thinking | Finalizing)
                | (Finalizing, Terminated)
        )
    }
}

/// 一次工具调用的不可变记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    pub sequence_number: usize,
}

/// Transcript 条目：工具调用及其结果，或决策失败等循环备注（备注不计入工具调用数）
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Tool { call: ToolCall, result: ToolResult },
    Note { step: usize, message: String },
}

impl TranscriptEntry {
    pub fn as_tool(&self) -> Option<(&ToolCall, &ToolResult)> {
        match self {
            TranscriptEntry::Tool { call, result } => Some((call, result)),
            TranscriptEntry::Note { .. } => None,
        }
    }
}

/// 循环状态
#[derive(Debug)]
pub struct LoopState {
    transcript: Vec<TranscriptEntry>,
    budget_remaining: usize,
    phase: LoopPhase,
    prior_context: Vec<Message>,
}

impl LoopState {
    pub fn new(max_tool_calls: usize, prior_context: Vec<Message>) -> Self {
        Self {
            transcript: Vec::new(),
            budget_remaining: max_tool_calls,
            phase: LoopPhase::Thinking,
            prior_context,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// 非法迁移只记警告，不改变阶段
    pub(crate) fn set_phase(&mut self, phase: LoopPhase) -> bool {
        if !self.phase().can_advance_to(phase) {
            tracing::warn!(from = ?self.phase, to = ?phase, "illegal loop phase transition");
            return false;
        }
        tracing::debug!(from = ?self.phase, to = ?phase, "loop phase");
        self.phase = phase;
        true
    }

    pub fn budget_remaining(&self) -> usize {
        self.budget_remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.budget_remaining == 0
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn prior_context(&self) -> &[Message] {
        &self.prior_context
    }

    pub fn tool_call_count(&self) -> usize {
        self.transcript.iter().filter(|e| e.as_tool().is_some()).count()
    }

    /// 预算内创建下一条 ToolCall 并扣减预算；预算耗尽返回 None
    pub(crate) fn begin_call(&mut self, name: String, arguments: Value) -> Option<ToolCall> {
        if self.budget_remaining == 0 {
            return None;
        }
        self.budget_remaining -= 1;
        Some(ToolCall {
            name,
            arguments,
            sequence_number: self.tool_call_count() + 1,
        })
    }

    pub(crate) fn record(&mut self, call: ToolCall, result: ToolResult) {
        self.transcript.push(TranscriptEntry::Tool { call, result });
    }

    pub(crate) fn note(&mut self, step: usize, message: impl Into<String>) {
        self.transcript.push(TranscriptEntry::Note {
            step,
            message: message.into(),
        });
    }

    pub fn into_transcript(self) -> Vec<TranscriptEntry> {
        self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_budget_is_decremented_per_call() {
        let mut state = LoopState::new(2, Vec::new());
        let first = state.begin_call("top_skills".into(), json!({})).unwrap();
        state.record(first, ToolResult::from_output(json!({"success": true, "message": "ok"}), true));
        let second = state.begin_call("top_skills".into(), json!({})).unwrap();
        assert_eq!(second.sequence_number, 2);
        assert!(state.is_exhausted());
        assert!(state.begin_call("top_skills".into(), json!({})).is_none());
    }

    #[test]
    fn test_notes_do_not_count_as_tool_calls() {
        let mut state = LoopState::new(3, Vec::new());
        state.note(0, "decision timed out");
        assert_eq!(state.tool_call_count(), 0);
        assert_eq!(state.transcript().len(), 1);
        assert_eq!(state.budget_remaining(), 3);
    }

    #[test]
    fn test_phase_transitions_follow_the_loop() {
        let mut state = LoopState::new(1, Vec::new());
        assert_eq!(state.phase(), LoopPhase::Thinking);
        assert!(state.set_phase(LoopPhase::Acting));
        assert!(state.set_phase(LoopPhase::Observing));
        assert!(state.set_phase(LoopPhase::Thinking));
        // 不能跳过 Finalizing 直接结束
        assert!(!state.set_phase(LoopPhase::Terminated));
        assert_eq!(state.phase(), LoopPhase::Thinking);
        assert!(state.set_phase(LoopPhase::Finalizing));
        assert!(state.set_phase(LoopPhase::Terminated));
        assert!(!state.set_phase(LoopPhase::Thinking));
    }
}
