//! 职位推荐工具
//!
//! 缺少 industry / position / skills 时不查询数据，返回 status = input_required 与 required_fields；
//! 否则按画像与职位文本的相似度给出推荐。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::analytics::{JobRecommender, JobRequirements, MAX_RECOMMENDATIONS};
use crate::core::{AgentError, ErrorCode};
use crate::tools::Tool;

pub struct RecommendJobsTool {
    recommender: Arc<JobRecommender>,
    default_limit: usize,
}

impl RecommendJobsTool {
    pub fn new(recommender: Arc<JobRecommender>, default_limit: usize) -> Self {
        Self {
            recommender,
            default_limit: default_limit.clamp(1, MAX_RECOMMENDATIONS),
        }
    }
}

fn text_arg(args: &Value, field: &str) -> Option<String> {
    args.get(field).and_then(Value::as_str).map(str::to_string)
}

/// skills 可以是字符串数组，也可以是逗号分隔的字符串
fn skills_arg(args: &Value) -> Vec<String> {
    match args.get("skills") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(joined)) => joined.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn requirements_from(args: &Value) -> JobRequirements {
    JobRequirements {
        industry: text_arg(args, "industry"),
        position: text_arg(args, "position"),
        skills: skills_arg(args),
        interests: text_arg(args, "interests"),
        job_description: text_arg(args, "job_description"),
        other_requirements: text_arg(args, "other_requirements"),
    }
}

#[async_trait]
impl Tool for RecommendJobsTool {
    fn name(&self) -> &str {
        "recommend_jobs"
    }

    fn description(&self) -> &str {
        "Recommend job postings that fit a candidate profile. industry, position and skills are required; if any is missing the result lists the fields to ask for. Args: {\"industry\": \"Fintech\", \"position\": \"Backend Engineer\", \"skills\": [..], \"interests\"?: str, \"job_description\"?: str, \"other_requirements\"?: str, \"limit\"?: 5}"
    }

    fn parameters_schema(&self) -> Value {
        let text = |description: &str| json!({"type": "string", "description": description});
        json!({
            "type": "object",
            "properties": {
                "industry": text("Target industry"),
                "position": text("Target position"),
                "skills": {
                    "anyOf": [
                        {"type": "array", "items": {"type": "string"}},
                        {"type": "string"}
                    ],
                    "description": "Candidate skills, as a list or comma-separated"
                },
                "interests": text("Topics the candidate cares about"),
                "job_description": text("Free-text description of the wanted job"),
                "other_requirements": text("Anything else, e.g. remote only"),
                "limit": {"type": "integer", "minimum": 1, "maximum": MAX_RECOMMENDATIONS}
            },
            "required": [],
            "additionalProperties": false
        })
    }

    fn is_analytics(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let requirements = requirements_from(&args);
        let profile_summary = requirements.profile_summary();

        let missing = requirements.missing_fields();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|(name, _)| *name).collect();
            return Ok(json!({
                "success": false,
                "status": "input_required",
                "message": format!("Missing required fields: {}", names.join(", ")),
                "required_fields": missing
                    .iter()
                    .map(|(name, description)| json!({"field_name": name, "description": description}))
                    .collect::<Vec<_>>(),
                "profile_summary": profile_summary,
            }));
        }

        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(self.default_limit, |n| n as usize);
        let recommendations = self.recommender.recommend(&requirements, limit).await?;

        let Some(best) = recommendations.first() else {
            return Ok(json!({
                "success": false,
                "status": "no_data",
                "message": "No job postings resemble this profile.",
                "error_code": ErrorCode::NoDataFound,
                "profile_summary": profile_summary,
                "recommendations": [],
            }));
        };
        let message = format!(
            "{} posting(s) match the profile; the closest is \"{}\" (job {}).",
            recommendations.len(),
            best.job_title,
            best.job_id
        );
        Ok(json!({
            "success": true,
            "status": "ok",
            "message": message,
            "profile_summary": profile_summary,
            "recommendations": recommendations,
            "summary": {
                "message": message,
                "top_name": best.job_title,
                "total_matched": recommendations.len(),
                "embedder": self.recommender.embedder_name(),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{InMemoryDemandStore, JobPosting};
    use crate::llm::HashingEmbedder;
    use crate::tools::ToolResult;
    use chrono::NaiveDate;

    fn tool(postings: Vec<JobPosting>) -> RecommendJobsTool {
        let recommender = JobRecommender::new(
            Arc::new(InMemoryDemandStore::new(postings)),
            Arc::new(HashingEmbedder::default()),
            100,
        );
        RecommendJobsTool::new(Arc::new(recommender), 5)
    }

    fn postings() -> Vec<JobPosting> {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        vec![
            JobPosting::new(1, "Backend Engineer", day)
                .with_expertise("Software Engineer")
                .with_skills(["Python", "SQL"]),
            JobPosting::new(2, "Data Analyst", day)
                .with_expertise("Data Analyst")
                .with_skills(["Excel", "SQL"]),
        ]
    }

    #[tokio::test]
    async fn test_missing_fields_ask_for_input() {
        let out = tool(postings())
            .execute(json!({"position": "Backend Engineer"}))
            .await
            .unwrap();
        assert_eq!(out["status"], "input_required");
        assert_eq!(out["message"], "Missing required fields: industry, skills");
        let fields: Vec<_> = out["required_fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field_name"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["industry", "skills"]);

        let result = ToolResult::from_output(out, true);
        assert!(result.needs_input());
        assert!(!result.is_error());
        assert!(!result.is_grounding_evidence());
    }

    #[tokio::test]
    async fn test_comma_separated_skills_are_accepted() {
        let out = tool(postings())
            .execute(json!({
                "industry": "Fintech",
                "position": "Backend Engineer",
                "skills": "Python, SQL",
                "limit": 1
            }))
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["recommendations"].as_array().unwrap().len(), 1);
        assert_eq!(out["recommendations"][0]["job_id"], 1);
        assert_eq!(out["recommendations"][0]["matched_skills"], json!(["Python", "SQL"]));
        assert_eq!(
            out["profile_summary"],
            "Industry: Fintech. Position: Backend Engineer. Skills: Python, SQL."
        );
        assert!(ToolResult::from_output(out, true).is_grounding_evidence());
    }

    #[tokio::test]
    async fn test_empty_dataset_is_no_data() {
        let out = tool(Vec::new())
            .execute(json!({"industry": "Retail", "position": "Cashier", "skills": ["POS"]}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error_code"], "NO_DATA_FOUND");
    }
}
