//! 认知层：决策协作者、LLM Planner、编排主循环与过程事件

pub mod decision;
pub mod events;
pub mod loop_;
pub mod planner;

pub use decision::{Decision, DecisionClient, DecisionContext, ScriptedDecisions};
pub use events::LoopEvent;
pub use loop_::{LoopConfig, LoopOutcome, LoopReport, OrchestrationLoop, Termination};
pub use planner::{parse_decision, PlannerDecisionClient, DEFAULT_SYSTEM_PROMPT};
