//! 需求分析工具：技能 / 职位的聚合需求与日趋势
//!
//! 四个工具共用 DemandTool，区别只在实体维度与粒度。工具产出的图表文件路径写进结果的 plot_path，
//! 图表失败只体现在 chart_error，不影响分析本身。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::analytics::{
    AnalyticsResult, AnalyticsStatus, DemandAnalyticsEngine, EntityKind, Granularity,
    QueryBuilder, ResolvedWindow, TimeWindowResolver,
};
use crate::charts::{demand_chart_title, ChartRenderer};
use crate::core::{AgentError, ErrorCode};
use crate::tools::schema::{names_schema, window_schema};
use crate::tools::Tool;

/// 单次请求最多分析的名称数
pub const MAX_NAMES_PER_CALL: usize = 20;

/// 市场分析工具共享的协作者
#[derive(Clone)]
pub struct MarketToolContext {
    pub engine: DemandAnalyticsEngine,
    pub builder: QueryBuilder,
    pub resolver: TimeWindowResolver,
    /// 调用方未给 window 时使用
    pub default_window: String,
    pub charts: Option<Arc<dyn ChartRenderer>>,
    pub top_limit: usize,
    pub min_frequency: u64,
}

impl MarketToolContext {
    pub fn resolve_window(&self, args: &Value) -> ResolvedWindow {
        let raw = args
            .get("window")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_window);
        self.resolver.resolve(raw)
    }
}

/// 读取字符串数组参数
pub(crate) fn string_list(args: &Value, field: &str) -> Result<Vec<String>, AgentError> {
    let items = args
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| AgentError::InvalidArgument(format!("\"{field}\" must be a list of names")))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| AgentError::InvalidArgument(format!("\"{field}\" must contain only strings")))
        })
        .collect()
}

pub struct DemandTool {
    ctx: Arc<MarketToolContext>,
    kind: EntityKind,
    granularity: Granularity,
}

impl DemandTool {
    pub fn skill_demand(ctx: Arc<MarketToolContext>) -> Self {
        Self { ctx, kind: EntityKind::Skill, granularity: Granularity::Aggregate }
    }

    pub fn job_role_demand(ctx: Arc<MarketToolContext>) -> Self {
        Self { ctx, kind: EntityKind::JobRole, granularity: Granularity::Aggregate }
    }

    pub fn skill_trend(ctx: Arc<MarketToolContext>) -> Self {
        Self { ctx, kind: EntityKind::Skill, granularity: Granularity::DailySeries }
    }

    pub fn job_role_trend(ctx: Arc<MarketToolContext>) -> Self {
        Self { ctx, kind: EntityKind::JobRole, granularity: Granularity::DailySeries }
    }

    fn names_field(&self) -> &'static str {
        match self.kind {
            EntityKind::Skill => "skills",
            EntityKind::JobRole => "roles",
        }
    }

    async fn to_output(&self, result: AnalyticsResult, render_chart: bool) -> Value {
        let mut out = Map::new();
        out.insert("status".into(), json!(result.status));
        out.insert("message".into(), json!(result.summary.message));
        out.insert("data".into(), json!(result.rows));
        out.insert("summary".into(), json!(result.summary));
        if self.granularity == Granularity::DailySeries && result.status != AnalyticsStatus::Error {
            out.insert("buckets".into(), json!(result.buckets));
            out.insert("series".into(), json!(result.series));
        }

        match result.status {
            AnalyticsStatus::Ok => {
                out.insert("success".into(), json!(true));
                if render_chart {
                    if let Some(charts) = &self.ctx.charts {
                        let title = demand_chart_title(self.kind, self.granularity, &result.requested);
                        match charts.render(&result, &title).await {
                            Ok(path) => {
                                out.insert("plot_path".into(), json!(path.display().to_string()));
                            }
                            Err(e) => {
                                tracing::warn!(tool = self.name(), error = %e, "chart rendering failed");
                                out.insert("chart_error".into(), json!(e.to_string()));
                            }
                        }
                    }
                }
            }
            AnalyticsStatus::NoData => {
                out.insert("success".into(), json!(false));
                out.insert("error_code".into(), json!(ErrorCode::NoDataFound));
            }
            AnalyticsStatus::Error => {
                out.insert("success".into(), json!(false));
                out.insert("error_code".into(), json!(ErrorCode::DatabaseQueryFailed));
            }
        }
        Value::Object(out)
    }
}

#[async_trait]
impl Tool for DemandTool {
    fn name(&self) -> &str {
        match (self.kind, self.granularity) {
            (EntityKind::Skill, Granularity::Aggregate) => "analyze_skill_demand",
            (EntityKind::JobRole, Granularity::Aggregate) => "analyze_job_role_demand",
            (EntityKind::Skill, Granularity::DailySeries) => "skill_demand_trend",
            (EntityKind::JobRole, Granularity::DailySeries) => "job_role_demand_trend",
        }
    }

    fn description(&self) -> &str {
        match (self.kind, self.granularity) {
            (EntityKind::Skill, Granularity::Aggregate) => {
                "Count job postings requiring each skill in a time window, with percentage of all skill-tagged postings. Args: {\"skills\": [..], \"window\"?: \"3m\", \"render_chart\"?: bool}"
            }
            (EntityKind::JobRole, Granularity::Aggregate) => {
                "Count job postings per job role (expertise) in a time window, with percentage of all postings. Args: {\"roles\": [..], \"window\"?: \"3m\", \"render_chart\"?: bool}"
            }
            (EntityKind::Skill, Granularity::DailySeries) => {
                "Daily posting counts per skill over the last four weeks with week-over-week growth. Args: {\"skills\": [..], \"render_chart\"?: bool}"
            }
            (EntityKind::JobRole, Granularity::DailySeries) => {
                "Daily posting counts per job role over the last four weeks with week-over-week growth. Args: {\"roles\": [..], \"render_chart\"?: bool}"
            }
        }
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let names_description = match self.kind {
            EntityKind::Skill => "Skill names, e.g. [\"Python\", \"React\"]",
            EntityKind::JobRole => "Job role names, e.g. [\"Data Scientist\"]",
        };
        properties.insert(
            self.names_field().into(),
            names_schema(names_description, MAX_NAMES_PER_CALL),
        );
        if self.granularity == Granularity::Aggregate {
            properties.insert("window".into(), window_schema());
        }
        properties.insert(
            "render_chart".into(),
            json!({"type": "boolean", "description": "Write a chart file and report its path"}),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": [self.names_field()],
            "additionalProperties": false
        })
    }

    fn is_analytics(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let names = string_list(&args, self.names_field())?;
        let window = match self.granularity {
            Granularity::Aggregate => self.ctx.resolve_window(&args),
            Granularity::DailySeries => ResolvedWindow::all(),
        };
        let render_chart = args
            .get("render_chart")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let plan = self
            .ctx
            .builder
            .build(self.kind, &names, window, self.granularity)?;
        let result = self.ctx.engine.analyze(&plan).await;
        Ok(self.to_output(result, render_chart).await)
    }
}
