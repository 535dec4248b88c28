pub mod categorize;
pub mod demand;
pub mod executor;
pub mod recommend;
pub mod registry;
pub mod schema;
pub mod top_skills;

use std::sync::Arc;

use crate::core::AgentError;

pub use categorize::CategorizeSkillsTool;
pub use demand::{DemandTool, MarketToolContext, MAX_NAMES_PER_CALL};
pub use executor::ToolExecutor;
pub use recommend::RecommendJobsTool;
pub use registry::{Tool, ToolRegistry, ToolResult, ToolSpec, ToolStatus, INPUT_REQUIRED};
pub use schema::{decision_schema_json, validate_arguments, window_schema};
pub use top_skills::{TopSkillsTool, TOP_SKILLS_CHART_TITLE};

/// 注册全部市场分析工具（顺序即目录顺序）
pub fn register_market_tools(
    registry: &mut ToolRegistry,
    ctx: Arc<MarketToolContext>,
) -> Result<(), AgentError> {
    registry.register(DemandTool::skill_demand(ctx.clone()))?;
    registry.register(DemandTool::job_role_demand(ctx.clone()))?;
    registry.register(DemandTool::skill_trend(ctx.clone()))?;
    registry.register(DemandTool::job_role_trend(ctx.clone()))?;
    registry.register(TopSkillsTool::new(ctx))?;
    registry.register(CategorizeSkillsTool)?;
    Ok(())
}
