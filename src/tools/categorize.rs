//! 技能分类工具（不查询数据，结果不能作为 completed 的依据）

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::analytics::categorize;
use crate::core::AgentError;
use crate::tools::demand::{string_list, MAX_NAMES_PER_CALL};
use crate::tools::schema::names_schema;
use crate::tools::Tool;

pub struct CategorizeSkillsTool;

#[async_trait]
impl Tool for CategorizeSkillsTool {
    fn name(&self) -> &str {
        "categorize_skills"
    }

    fn description(&self) -> &str {
        "Group skill names into categories (programming, AI/ML, data, cloud, web, databases, soft skills, tools). Args: {\"skills\": [..]}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "skills": names_schema("Skill names to categorize", MAX_NAMES_PER_CALL * 5)
            },
            "required": ["skills"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let skills = string_list(&args, "skills")?;
        let groups = categorize(&skills);
        let total: usize = groups.iter().map(|g| g.skills.len()).sum();
        Ok(json!({
            "success": true,
            "message": format!("Grouped {} skills into {} categories.", total, groups.len()),
            "data": groups,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_groups_are_reported() {
        let out = CategorizeSkillsTool
            .execute(json!({"skills": ["Python", "AWS", "Leadership"]}))
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["data"].as_array().unwrap().len(), 3);
        assert!(!CategorizeSkillsTool.is_analytics());
    }
}
