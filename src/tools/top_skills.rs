//! Top N 热门技能
//!
//! render_chart 时写出排行榜柱状图；图表失败只体现在 chart_error。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::analytics::{AnalyticsStatus, EntityKind, MAX_RANKING_LIMIT};
use crate::core::{AgentError, ErrorCode};
use crate::tools::demand::MarketToolContext;
use crate::tools::schema::window_schema;
use crate::tools::Tool;

pub const TOP_SKILLS_CHART_TITLE: &str = "Top skills";

pub struct TopSkillsTool {
    ctx: Arc<MarketToolContext>,
}

impl TopSkillsTool {
    pub fn new(ctx: Arc<MarketToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for TopSkillsTool {
    fn name(&self) -> &str {
        "top_skills"
    }

    fn description(&self) -> &str {
        "Most requested skills in a time window with percentages and a category breakdown. Args: {\"window\"?: \"3m\", \"limit\"?: 20, \"min_frequency\"?: 2, \"render_chart\"?: bool}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "window": window_schema(),
                "limit": {"type": "integer", "minimum": 1, "maximum": MAX_RANKING_LIMIT},
                "min_frequency": {"type": "integer", "minimum": 1},
                "render_chart": {"type": "boolean", "description": "Write a chart file and report its path"}
            },
            "required": [],
            "additionalProperties": false
        })
    }

    fn is_analytics(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let window = self.ctx.resolve_window(&args);
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(self.ctx.top_limit, |n| n as usize);
        let min_frequency = args
            .get("min_frequency")
            .and_then(Value::as_u64)
            .unwrap_or(self.ctx.min_frequency);
        let render_chart = args
            .get("render_chart")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let plan = self
            .ctx
            .builder
            .build_ranking(EntityKind::Skill, window, limit, min_frequency)?;
        let ranking = self.ctx.engine.rank_top(&plan).await;

        let mut out = json!({
            "success": ranking.status == AnalyticsStatus::Ok,
            "status": ranking.status,
            "message": ranking.summary.message,
            "data": ranking.rows,
            "categories": ranking.categories,
            "summary": ranking.summary,
        });
        let code = match ranking.status {
            AnalyticsStatus::Ok => None,
            AnalyticsStatus::NoData => Some(ErrorCode::NoDataFound),
            AnalyticsStatus::Error => Some(ErrorCode::DatabaseQueryFailed),
        };
        let Some(obj) = out.as_object_mut() else {
            return Ok(out);
        };
        if let Some(code) = code {
            obj.insert("error_code".into(), json!(code));
        } else if render_chart {
            if let Some(charts) = &self.ctx.charts {
                match charts.render_ranking(&ranking, TOP_SKILLS_CHART_TITLE).await {
                    Ok(path) => {
                        obj.insert("plot_path".into(), json!(path.display().to_string()));
                    }
                    Err(e) => {
                        tracing::warn!(tool = self.name(), error = %e, "chart rendering failed");
                        obj.insert("chart_error".into(), json!(e.to_string()));
                    }
                }
            }
        }
        Ok(out)
    }
}
