//! 错误恢复引擎
//!
//! 根据决策阶段的 AgentError 返回 RecoveryAction，供编排循环决定是带提示重试还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作（重试提示 / 终止）
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::DecisionFailed(raw) => RecoveryAction::RetryWithPrompt(format!(
                "The previous decision could not be parsed: {raw}. \
                Reply with exactly one JSON object, either \
                {{\"action\": \"call_tool\", \"name\": \"<tool>\", \"arguments\": {{...}}}} or \
                {{\"action\": \"finalize\", \"status\": \"completed|failed|input_required\", \"payload\": {{...}}}}."
            )),
            AgentError::DecisionTimeout(secs) => RecoveryAction::RetryWithPrompt(format!(
                "The previous decision step timed out after {secs}s. Decide again with a short reply."
            )),
            AgentError::Registry(_) | AgentError::Config(_) | AgentError::Cancelled => {
                RecoveryAction::Abort
            }
            // 工具失败走 ToolResult，不经过这里；其余错误只可能来自自定义决策协作者
            other => RecoveryAction::RetryWithPrompt(format!(
                "The decision step failed: {other}. Decide again."
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::StorageError;

    #[test]
    fn test_recovery_decision_parse_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::DecisionFailed("expected value at line 1".to_string());
        match engine.handle(&err) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("JSON"));
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected RetryWithPrompt"),
        }
    }

    #[test]
    fn test_recovery_decision_timeout() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::DecisionTimeout(60));
        assert!(matches!(action, RecoveryAction::RetryWithPrompt(p) if p.contains("60s")));
    }

    #[test]
    fn test_recovery_other_decision_errors_get_generic_retry() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Storage(StorageError::Timeout("5s".into()));
        match engine.handle(&err) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.starts_with("The decision step failed"));
                assert!(msg.contains("5s"));
            }
            _ => panic!("Expected RetryWithPrompt"),
        }
    }

    #[test]
    fn test_recovery_registry_error_aborts() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Registry("no tools registered".into());
        assert!(matches!(engine.handle(&err), RecoveryAction::Abort));
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert!(matches!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort));
    }
}
