//! 职位推荐
//!
//! 求职画像（行业、职位、技能，及可选的兴趣、描述、其他要求）与最新职位的文本分别嵌入，
//! 按余弦相似度降序取前 n 条；相似度不大于 0 的职位不推荐。

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analytics::{DemandStore, JobPosting, NamePattern};
use crate::core::AgentError;
use crate::llm::{cosine_similarity, EmbeddingProvider};

pub const DEFAULT_RECOMMENDATIONS: usize = 5;
pub const MAX_RECOMMENDATIONS: usize = 20;

/// 推荐前必须提供的画像字段（字段名、说明）
pub const REQUIRED_PROFILE_FIELDS: [(&str, &str); 3] = [
    ("industry", "The industry you want to work in, e.g. Fintech"),
    ("position", "The position you are looking for, e.g. Backend Engineer"),
    ("skills", "Your main skills, e.g. Python, SQL"),
];

/// 求职画像
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequirements {
    pub industry: Option<String>,
    pub position: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub interests: Option<String>,
    pub job_description: Option<String>,
    pub other_requirements: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl JobRequirements {
    fn skills(&self) -> Vec<&str> {
        self.skills
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// 缺失的必填字段，顺序同 REQUIRED_PROFILE_FIELDS
    pub fn missing_fields(&self) -> Vec<(&'static str, &'static str)> {
        REQUIRED_PROFILE_FIELDS
            .iter()
            .copied()
            .filter(|(name, _)| match *name {
                "industry" => present(&self.industry).is_none(),
                "position" => present(&self.position).is_none(),
                _ => self.skills().is_empty(),
            })
            .collect()
    }

    /// 画像的一行描述，如 `Industry: Fintech. Position: Backend Engineer. Skills: Python, SQL.`
    pub fn profile_summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(industry) = present(&self.industry) {
            parts.push(format!("Industry: {industry}."));
        }
        if let Some(position) = present(&self.position) {
            parts.push(format!("Position: {position}."));
        }
        let skills = self.skills();
        if !skills.is_empty() {
            parts.push(format!("Skills: {}.", skills.join(", ")));
        }
        for (label, value) in [
            ("Interests", &self.interests),
            ("Job description", &self.job_description),
            ("Other requirements", &self.other_requirements),
        ] {
            if let Some(value) = present(value) {
                parts.push(format!("{label}: {value}."));
            }
        }
        parts.join(" ")
    }

    /// 嵌入用文本：只拼字段值，不带标签
    fn embedding_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(present(&self.industry));
        parts.extend(present(&self.position));
        parts.extend(self.skills());
        parts.extend(present(&self.interests));
        parts.extend(present(&self.job_description));
        parts.extend(present(&self.other_requirements));
        parts.join(" ")
    }
}

fn posting_text(posting: &JobPosting) -> String {
    let mut parts: Vec<&str> = vec![posting.title.as_str()];
    parts.extend(posting.job_expertise.as_deref());
    parts.extend(posting.skills.iter().map(String::as_str));
    parts.join(" ")
}

/// 一条推荐
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecommendation {
    pub job_id: i64,
    pub job_title: String,
    pub job_expertise: Option<String>,
    pub posted_date: NaiveDate,
    pub skills: Vec<String>,
    /// 与画像技能整词匹配的职位技能
    pub matched_skills: Vec<String>,
    pub similarity: f32,
}

pub struct JobRecommender {
    store: Arc<dyn DemandStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    max_candidates: usize,
}

impl JobRecommender {
    pub fn new(
        store: Arc<dyn DemandStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        max_candidates: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            max_candidates: max_candidates.max(1),
        }
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// 按相似度降序返回至多 limit 条；相同相似度时新职位优先，再按 job_id 升序
    pub async fn recommend(
        &self,
        requirements: &JobRequirements,
        limit: usize,
    ) -> Result<Vec<JobRecommendation>, AgentError> {
        let limit = limit.clamp(1, MAX_RECOMMENDATIONS);
        let candidates = self.store.recent_postings(self.max_candidates).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let profile = self
            .embedder
            .embed(&requirements.embedding_text())
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("embedding failed: {e}")))?;
        let texts: Vec<String> = candidates.iter().map(posting_text).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("embedding failed: {e}")))?;
        if vectors.len() != candidates.len() {
            return Err(AgentError::ToolExecutionFailed(format!(
                "embedding returned {} vectors for {} postings",
                vectors.len(),
                candidates.len()
            )));
        }

        let wanted: Vec<NamePattern> = requirements
            .skills()
            .into_iter()
            .map(NamePattern::new)
            .collect();

        let mut scored: Vec<JobRecommendation> = candidates
            .into_iter()
            .zip(vectors.iter())
            .map(|(posting, vector)| {
                let similarity = cosine_similarity(&profile, vector);
                let matched_skills = posting
                    .skills
                    .iter()
                    .filter(|skill| wanted.iter().any(|w| w.matches(skill)))
                    .cloned()
                    .collect();
                JobRecommendation {
                    job_id: posting.job_id,
                    job_title: posting.title,
                    job_expertise: posting.job_expertise,
                    posted_date: posting.posted_date,
                    skills: posting.skills,
                    matched_skills,
                    similarity,
                }
            })
            .filter(|r| r.similarity > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.posted_date.cmp(&a.posted_date))
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        scored.truncate(limit);
        tracing::debug!(
            embedder = self.embedder.name(),
            returned = scored.len(),
            "job recommendations ranked"
        );
        Ok(scored)
    }
}
