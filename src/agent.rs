//! Headless Agent 运行时
//!
//! AgentRuntime 从配置构建存储、分析引擎、工具注册表与执行器，可被多个请求共享；
//! handle_task 对一个 AgentTask 跑一次编排循环并返回 TaskOutput。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analytics::{
    DemandAnalyticsEngine, DemandStore, JobRecommender, QueryBuilder, SqliteDemandStore,
    TimeWindowResolver,
};
use crate::charts::{ChartRenderer, JsonChartWriter};
use crate::config::AppConfig;
use crate::core::{AgentError, ErrorCode, TaskScheduler};
use crate::llm::create_embedder_from_config;
use crate::protocol::{AgentResponse, AgentTask, TaskOutput};
use crate::react::{
    Decision, DecisionClient, LoopConfig, LoopEvent, LoopOutcome, OrchestrationLoop,
    ScriptedDecisions,
};
use crate::tools::{
    register_market_tools, MarketToolContext, RecommendJobsTool, ToolExecutor, ToolRegistry,
};

/// 预构建的 Agent 组件，可多请求共享
pub struct AgentRuntime {
    config: AppConfig,
    context: Arc<MarketToolContext>,
    recommender: Arc<JobRecommender>,
    executor: Arc<ToolExecutor>,
}

impl AgentRuntime {
    /// 打开配置中的 SQLite 数据集并构建运行时
    pub fn open(config: AppConfig) -> Result<Self, AgentError> {
        let store = SqliteDemandStore::open(&config.storage.db_path)?;
        info!(db = %config.storage.db_path.display(), "job dataset opened");
        Self::build(config, Arc::new(store))
    }

    pub fn build(config: AppConfig, store: Arc<dyn DemandStore>) -> Result<Self, AgentError> {
        Self::with_resolver(config, store, TimeWindowResolver::new())
    }

    /// 指定窗口解析器（测试中冻结"今天"）
    pub fn with_resolver(
        config: AppConfig,
        store: Arc<dyn DemandStore>,
        resolver: TimeWindowResolver,
    ) -> Result<Self, AgentError> {
        let charts: Arc<dyn ChartRenderer> =
            Arc::new(JsonChartWriter::new(config.charts.output_dir.clone()));
        let recommender = Arc::new(JobRecommender::new(
            store.clone(),
            create_embedder_from_config(&config.recommend),
            config.recommend.max_candidates,
        ));
        let context = Arc::new(MarketToolContext {
            engine: DemandAnalyticsEngine::new(store),
            builder: QueryBuilder::new(resolver, config.analytics.series_lookback_days),
            resolver,
            default_window: config.agent.default_window.clone(),
            charts: Some(charts),
            top_limit: config.analytics.top_limit,
            min_frequency: config.analytics.min_frequency,
        });

        let mut registry = ToolRegistry::new();
        register_market_tools(&mut registry, context.clone())?;
        registry.register(RecommendJobsTool::new(
            recommender.clone(),
            config.recommend.default_limit,
        ))?;
        registry.check_integrity()?;

        let executor = Arc::new(ToolExecutor::with_scheduler(
            Arc::new(registry),
            config.agent.tool_timeout_secs,
            TaskScheduler::new(config.agent.max_concurrent_tools),
        ));

        Ok(Self {
            config,
            context,
            recommender,
            executor,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<MarketToolContext> {
        &self.context
    }

    pub fn recommender(&self) -> &Arc<JobRecommender> {
        &self.recommender
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_tool_calls: self.config.agent.max_tool_calls,
            decision_timeout: Duration::from_secs(self.config.agent.decision_timeout_secs.max(1)),
            max_decision_failures: self.config.agent.max_decision_failures,
        }
    }

    /// 用给定决策协作者构建编排循环
    pub fn orchestration_loop(&self, decisions: Arc<dyn DecisionClient>) -> OrchestrationLoop {
        OrchestrationLoop::new(self.executor.clone(), decisions, self.loop_config())
    }

    /// 处理一个任务；校验失败返回 failed（INVALID_INPUT_FORMAT），取消返回 Err(Cancelled)
    pub async fn handle_task(
        &self,
        task: &AgentTask,
        decisions: Arc<dyn DecisionClient>,
        cancel_token: &CancellationToken,
        event_tx: Option<mpsc::UnboundedSender<LoopEvent>>,
    ) -> Result<TaskOutput, AgentError> {
        let start_time = Utc::now();
        let mut metadata = task.metadata.clone();

        let validated = match task.validate() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "task rejected");
                let session_id = task
                    .session_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let response = AgentResponse::failed(ErrorCode::InvalidInputFormat, e.to_string());
                return Ok(TaskOutput::new(session_id, start_time, Vec::new(), response, metadata));
            }
        };

        let mut orchestration = self.orchestration_loop(decisions);
        if let Some(tx) = event_tx {
            orchestration = orchestration.with_event_tx(tx);
        }

        let report = match orchestration
            .run(&validated.query, validated.prior_context, cancel_token)
            .await
        {
            LoopOutcome::Finished(report) => report,
            LoopOutcome::Cancelled => return Err(AgentError::Cancelled),
        };

        metadata.insert("request_id".into(), Value::from(report.request_id.clone()));
        metadata.insert("termination".into(), Value::from(format!("{:?}", report.termination)));
        metadata.insert("steps".into(), Value::from(report.steps));
        Ok(TaskOutput::new(
            validated.session_id,
            start_time,
            report.transcript,
            report.response,
            metadata,
        ))
    }
}

/// 不依赖 LLM 的固定策略：先分析给定技能，再声明 completed
pub fn scripted_analysis_policy(skills: &[String], window: Option<&str>) -> ScriptedDecisions {
    let mut arguments = json!({ "skills": skills });
    if let Some(window) = window {
        arguments["window"] = Value::from(window);
    }
    ScriptedDecisions::new([
        Decision::call("analyze_skill_demand", arguments),
        Decision::finalize(
            "completed",
            json!({
                "reasoning": format!("Demand for {} was measured directly from the posting dataset.", skills.join(", ")),
                "criteria_used": ["posting frequency", "share of skill-tagged postings"],
            }),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{InMemoryDemandStore, JobPosting};
    use crate::protocol::TaskMessage;
    use chrono::NaiveDate;

    fn runtime(dir: &std::path::Path) -> AgentRuntime {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let store = InMemoryDemandStore::new(vec![
            JobPosting::new(1, "Backend", today).with_skills(["Python", "SQL"]),
            JobPosting::new(2, "Data", today).with_skills(["Python"]),
        ]);
        let mut config = AppConfig::default();
        config.charts.output_dir = dir.to_path_buf();
        AgentRuntime::with_resolver(config, Arc::new(store), TimeWindowResolver::frozen(today)).unwrap()
    }

    #[tokio::test]
    async fn test_scripted_policy_completes() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let policy = scripted_analysis_policy(&["Python".to_string()], Some("4w"));
        let out = rt
            .handle_task(
                &AgentTask::from_query("How hot is Python?"),
                Arc::new(policy),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(out.state, "completed");
        assert_eq!(out.process_sequence.len(), 1);
        assert!(out.metadata.contains_key("request_id"));
    }

    #[tokio::test]
    async fn test_invalid_task_is_failed_response() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let task = AgentTask {
            messages: vec![TaskMessage { role: "robot".into(), content: "hi".into() }],
            ..Default::default()
        };
        let out = rt
            .handle_task(&task, Arc::new(ScriptedDecisions::default()), &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(out.final_response.error_code(), Some(ErrorCode::InvalidInputFormat));
    }

    #[tokio::test]
    async fn test_cancelled_task_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let token = CancellationToken::new();
        token.cancel();
        let result = rt
            .handle_task(
                &AgentTask::from_query("q"),
                Arc::new(ScriptedDecisions::default()),
                &token,
                None,
            )
            .await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }
}
