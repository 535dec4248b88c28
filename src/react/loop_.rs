//! 编排主循环
//!
//! Thinking -> Acting -> Observing -> {Thinking | Finalizing} -> Terminated。
//! 每次请求的工具调用（含未知工具、参数被拒）都扣减预算并进入 transcript；预算耗尽即强制 Finalizing。
//! 决策失败记为 transcript 备注并按 RecoveryEngine 重试，连续失败超过上限则终止。
//! 取消只在 Thinking / Acting 边界生效，取消时丢弃部分 transcript。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{
    preview, AgentError, LoopPhase, LoopState, RecoveryAction, RecoveryEngine, TranscriptEntry,
};
use crate::llm::Message;
use crate::protocol::{AgentResponse, ResponseProtocol};
use crate::react::{Decision, DecisionClient, DecisionContext, LoopEvent};
use crate::tools::ToolExecutor;

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct LoopConfig {
    pub max_tool_calls: usize,
    pub decision_timeout: Duration,
    /// 允许的连续决策失败次数，超过即终止
    pub max_decision_failures: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: 10,
            decision_timeout: Duration::from_secs(60),
            max_decision_failures: 3,
        }
    }
}

/// 循环为何结束
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// 决策协作者声明结束
    Declared,
    BudgetExhausted,
    /// 连续决策失败超过上限
    DecisionFailures,
    /// 不可恢复的内部错误（如工具注册表不可用）
    Fatal,
}

#[derive(Debug)]
pub struct LoopReport {
    pub request_id: String,
    pub response: AgentResponse,
    pub transcript: Vec<TranscriptEntry>,
    pub termination: Termination,
    /// Thinking 步数
    pub steps: usize,
}

#[derive(Debug)]
pub enum LoopOutcome {
    Finished(LoopReport),
    Cancelled,
}

impl LoopOutcome {
    pub fn into_report(self) -> Option<LoopReport> {
        match self {
            LoopOutcome::Finished(report) => Some(report),
            LoopOutcome::Cancelled => None,
        }
    }
}

pub struct OrchestrationLoop {
    executor: Arc<ToolExecutor>,
    decisions: Arc<dyn DecisionClient>,
    recovery: RecoveryEngine,
    protocol: ResponseProtocol,
    config: LoopConfig,
    event_tx: Option<mpsc::UnboundedSender<LoopEvent>>,
}

impl OrchestrationLoop {
    pub fn new(
        executor: Arc<ToolExecutor>,
        decisions: Arc<dyn DecisionClient>,
        config: LoopConfig,
    ) -> Self {
        Self {
            executor,
            decisions,
            recovery: RecoveryEngine::new(),
            protocol: ResponseProtocol::new(),
            config,
            event_tx: None,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    fn send_event(&self, ev: LoopEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    /// 处理一次请求；除取消外总是产生一个 AgentResponse
    pub async fn run(
        &self,
        request: &str,
        prior_context: Vec<Message>,
        cancel_token: &CancellationToken,
    ) -> LoopOutcome {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut state = LoopState::new(self.config.max_tool_calls, prior_context);
        let mut step = 0usize;
        let mut consecutive_failures = 0usize;

        info!(request_id = %request_id, budget = self.config.max_tool_calls, "orchestration started");

        if let Err(e) = self.executor.registry().check_integrity() {
            warn!(request_id = %request_id, error = %e, "tool registry unusable");
            state.set_phase(LoopPhase::Finalizing);
            return self.finish(request_id, state, self.protocol.finalize_fatal(&e), Termination::Fatal, step);
        }
        let catalog = self.executor.catalog();

        loop {
            if cancel_token.is_cancelled() {
                info!(request_id = %request_id, "orchestration cancelled");
                return LoopOutcome::Cancelled;
            }

            if state.is_exhausted() {
                state.set_phase(LoopPhase::Finalizing);
                self.send_event(LoopEvent::BudgetExhausted {
                    tool_calls: state.tool_call_count(),
                });
                info!(request_id = %request_id, tool_calls = state.tool_call_count(), "tool budget exhausted");
                let response = self.protocol.finalize_exhausted(state.transcript());
                return self.finish(request_id, state, response, Termination::BudgetExhausted, step);
            }

            step += 1;
            state.set_phase(LoopPhase::Thinking);
            self.send_event(LoopEvent::StepUpdate {
                step,
                budget_remaining: state.budget_remaining(),
            });
            self.send_event(LoopEvent::Thinking);

            let decision = {
                let ctx = DecisionContext {
                    request,
                    prior_context: state.prior_context(),
                    transcript: state.transcript(),
                    catalog: &catalog,
                    budget_remaining: state.budget_remaining(),
                };
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        info!(request_id = %request_id, "orchestration cancelled while thinking");
                        return LoopOutcome::Cancelled;
                    }
                    r = timeout(self.config.decision_timeout, self.decisions.decide(&ctx)) => match r {
                        Ok(decision) => decision,
                        Err(_) => Err(AgentError::DecisionTimeout(self.config.decision_timeout.as_secs())),
                    },
                }
            };

            match decision {
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(request_id = %request_id, step, error = %e, failures = consecutive_failures, "decision failed");
                    match self.recovery.handle(&e) {
                        RecoveryAction::RetryWithPrompt(hint)
                            if consecutive_failures <= self.config.max_decision_failures =>
                        {
                            self.send_event(LoopEvent::Recovery {
                                action: "RetryWithPrompt".to_string(),
                                detail: hint.clone(),
                            });
                            state.note(step, hint);
                        }
                        RecoveryAction::RetryWithPrompt(_) => {
                            state.note(step, e.to_string());
                            state.set_phase(LoopPhase::Finalizing);
                            let response = self.protocol.finalize_fatal(&AgentError::DecisionFailed(format!(
                                "{} consecutive decision failures, last: {}",
                                consecutive_failures, e
                            )));
                            return self.finish(request_id, state, response, Termination::DecisionFailures, step);
                        }
                        RecoveryAction::Abort => {
                            self.send_event(LoopEvent::Recovery {
                                action: "Abort".to_string(),
                                detail: e.to_string(),
                            });
                            state.note(step, e.to_string());
                            state.set_phase(LoopPhase::Finalizing);
                            let response = self.protocol.finalize_fatal(&e);
                            return self.finish(request_id, state, response, Termination::Fatal, step);
                        }
                    }
                }
                Ok(Decision::Finalize { status, payload }) => {
                    state.set_phase(LoopPhase::Finalizing);
                    debug!(request_id = %request_id, status = ?status, "finalize declared");
                    let response = self
                        .protocol
                        .finalize(state.transcript(), status.as_deref(), &payload);
                    return self.finish(request_id, state, response, Termination::Declared, step);
                }
                Ok(Decision::CallTool { name, arguments }) => {
                    consecutive_failures = 0;
                    state.set_phase(LoopPhase::Acting);
                    let Some(call) = state.begin_call(name.clone(), arguments.clone()) else {
                        continue;
                    };
                    self.send_event(LoopEvent::ToolCall {
                        tool: name.clone(),
                        args: arguments.clone(),
                        sequence_number: call.sequence_number,
                    });

                    let result = tokio::select! {
                        _ = cancel_token.cancelled() => {
                            info!(request_id = %request_id, tool = %name, "orchestration cancelled while acting");
                            return LoopOutcome::Cancelled;
                        }
                        r = self.executor.execute(&name, arguments) => r,
                    };

                    state.set_phase(LoopPhase::Observing);
                    if result.is_error() {
                        self.send_event(LoopEvent::ToolFailure {
                            tool: name.clone(),
                            reason: result.summary(),
                        });
                    } else {
                        self.send_event(LoopEvent::Observation {
                            tool: name.clone(),
                            preview: preview(&result.summary(), OBSERVATION_PREVIEW_CHARS),
                        });
                    }
                    debug!(
                        request_id = %request_id,
                        tool = %name,
                        seq = call.sequence_number,
                        success = result.success,
                        "observation recorded"
                    );
                    state.record(call, result);
                }
            }
        }
    }

    fn finish(
        &self,
        request_id: String,
        mut state: LoopState,
        response: AgentResponse,
        termination: Termination,
        steps: usize,
    ) -> LoopOutcome {
        state.set_phase(LoopPhase::Terminated);
        self.send_event(LoopEvent::Finalized {
            status: response.status().to_string(),
        });
        info!(
            request_id = %request_id,
            status = response.status(),
            termination = ?termination,
            tool_calls = state.tool_call_count(),
            "orchestration finished"
        );
        LoopOutcome::Finished(LoopReport {
            request_id,
            response,
            transcript: state.into_transcript(),
            termination,
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCode;
    use crate::react::ScriptedDecisions;
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Grounded;

    #[async_trait]
    impl Tool for Grounded {
        fn name(&self) -> &str {
            "analyze"
        }
        fn description(&self) -> &str {
            "Always finds data"
        }
        fn is_analytics(&self) -> bool {
            true
        }
        async fn execute(&self, _args: Value) -> Result<Value, AgentError> {
            Ok(json!({
                "success": true,
                "message": "Python leads",
                "summary": {"message": "Python leads skill demand."}
            }))
        }
    }

    fn executor() -> Arc<ToolExecutor> {
        let mut registry = ToolRegistry::new();
        registry.register(Grounded).unwrap();
        Arc::new(ToolExecutor::new(Arc::new(registry), 5))
    }

    fn looped(decisions: ScriptedDecisions, max_tool_calls: usize) -> OrchestrationLoop {
        OrchestrationLoop::new(
            executor(),
            Arc::new(decisions),
            LoopConfig {
                max_tool_calls,
                ..LoopConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_call_then_finalize_completes() {
        let l = looped(
            ScriptedDecisions::new([
                Decision::call("analyze", json!({})),
                Decision::finalize("completed", json!({"reasoning": "Python is hot."})),
            ]),
            10,
        );
        let report = l.run("python?", Vec::new(), &CancellationToken::new()).await.into_report().unwrap();
        assert_eq!(report.termination, Termination::Declared);
        assert!(report.response.is_completed());
        assert_eq!(report.transcript.len(), 1);
        assert_eq!(report.steps, 2);
    }

    #[tokio::test]
    async fn test_budget_is_never_exceeded() {
        let l = looped(ScriptedDecisions::repeating(Decision::call("analyze", json!({}))), 3);
        let report = l.run("loop forever", Vec::new(), &CancellationToken::new()).await.into_report().unwrap();
        assert_eq!(report.termination, Termination::BudgetExhausted);
        let calls = report.transcript.iter().filter(|e| e.as_tool().is_some()).count();
        assert_eq!(calls, 3);
        // 有依据时预算耗尽仍为 completed
        assert!(report.response.is_completed());
    }

    #[tokio::test]
    async fn test_unknown_tools_consume_budget() {
        let l = looped(ScriptedDecisions::repeating(Decision::call("rm_rf", json!({}))), 2);
        let report = l.run("q", Vec::new(), &CancellationToken::new()).await.into_report().unwrap();
        assert_eq!(report.transcript.len(), 2);
        assert_eq!(report.response.error_code(), Some(ErrorCode::InvalidInputFormat));
    }

    #[tokio::test]
    async fn test_repeated_decision_failures_terminate() {
        let l = looped(ScriptedDecisions::default(), 10);
        let report = l.run("q", Vec::new(), &CancellationToken::new()).await.into_report().unwrap();
        assert_eq!(report.termination, Termination::DecisionFailures);
        assert_eq!(report.response.error_code(), Some(ErrorCode::ToolExecutionError));
        // 3 次允许的重试 + 1 次终止，全部记为备注
        assert_eq!(report.transcript.len(), 4);
        assert!(report.transcript.iter().all(|e| e.as_tool().is_none()));
    }

    #[tokio::test]
    async fn test_empty_registry_is_fatal() {
        let l = OrchestrationLoop::new(
            Arc::new(ToolExecutor::new(Arc::new(ToolRegistry::new()), 5)),
            Arc::new(ScriptedDecisions::repeating(Decision::call("analyze", json!({})))),
            LoopConfig::default(),
        );
        let report = l.run("q", Vec::new(), &CancellationToken::new()).await.into_report().unwrap();
        assert_eq!(report.termination, Termination::Fatal);
        assert!(report.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let l = looped(ScriptedDecisions::repeating(Decision::call("analyze", json!({}))), 3);
        assert!(matches!(l.run("q", Vec::new(), &token).await, LoopOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let l = looped(
            ScriptedDecisions::new([
                Decision::call("analyze", json!({})),
                Decision::finalize("completed", Value::Null),
            ]),
            5,
        )
        .with_event_tx(tx);
        l.run("q", Vec::new(), &CancellationToken::new()).await;
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert!(events.iter().any(|e| matches!(e, LoopEvent::ToolCall { sequence_number: 1, .. })));
        assert_eq!(
            events.last(),
            Some(&LoopEvent::Finalized { status: "completed".into() })
        );
    }
}
