//! 内存版 DemandStore：postings 常驻内存，语义与 SqliteDemandStore 一致（测试与演示用）

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analytics::{
    DailyCount, DemandStore, EntityCount, EntityKind, Granularity, MatchCount, MatchRows,
    QueryPlan, RankingPlan, ResolvedWindow, StorageError,
};

/// 一条职位记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub job_id: i64,
    pub title: String,
    pub job_expertise: Option<String>,
    pub posted_date: NaiveDate,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl JobPosting {
    pub fn new(job_id: i64, title: impl Into<String>, posted_date: NaiveDate) -> Self {
        Self {
            job_id,
            title: title.into(),
            job_expertise: None,
            posted_date,
            skills: Vec::new(),
        }
    }

    pub fn with_expertise(mut self, expertise: impl Into<String>) -> Self {
        self.job_expertise = Some(expertise.into());
        self
    }

    pub fn with_skills<S: Into<String>>(mut self, skills: impl IntoIterator<Item = S>) -> Self {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    /// 该职位在给定实体维度下的候选名称
    fn entity_names(&self, kind: EntityKind) -> Vec<&str> {
        match kind {
            EntityKind::Skill => self.skills.iter().map(String::as_str).collect(),
            EntityKind::JobRole => self.job_expertise.as_deref().into_iter().collect(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryDemandStore {
    postings: Vec<JobPosting>,
}

impl InMemoryDemandStore {
    pub fn new(postings: Vec<JobPosting>) -> Self {
        Self { postings }
    }

    pub fn push(&mut self, posting: JobPosting) {
        self.postings.push(posting);
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    fn in_window<'a>(&'a self, window: &'a ResolvedWindow) -> impl Iterator<Item = &'a JobPosting> {
        self.postings
            .iter()
            .filter(move |p| window.contains(p.posted_date))
    }
}

#[async_trait]
impl DemandStore for InMemoryDemandStore {
    async fn count_universe(
        &self,
        kind: EntityKind,
        window: &ResolvedWindow,
    ) -> Result<u64, StorageError> {
        let ids: HashSet<i64> = self
            .in_window(window)
            .filter(|p| kind == EntityKind::JobRole || !p.skills.is_empty())
            .map(|p| p.job_id)
            .collect();
        Ok(ids.len() as u64)
    }

    async fn count_matches(&self, plan: &QueryPlan) -> Result<MatchRows, StorageError> {
        // (name_index, day) -> (mentions, distinct postings)
        let mut buckets: BTreeMap<(usize, Option<NaiveDate>), (u64, HashSet<i64>)> = BTreeMap::new();
        let daily = plan.granularity == Granularity::DailySeries;

        for posting in self.in_window(&plan.window) {
            for candidate in posting.entity_names(plan.entity_kind) {
                for (idx, pattern) in plan.names.iter().enumerate() {
                    if pattern.matches(candidate) {
                        let day = daily.then_some(posting.posted_date);
                        let entry = buckets.entry((idx, day)).or_default();
                        entry.0 += 1;
                        entry.1.insert(posting.job_id);
                    }
                }
            }
        }

        if daily {
            let rows = buckets
                .into_iter()
                .filter_map(|((name_index, day), (frequency, ids))| {
                    day.map(|day| DailyCount {
                        name_index,
                        day,
                        frequency,
                        unique_count: ids.len() as u64,
                    })
                })
                .collect();
            Ok(MatchRows::Daily(rows))
        } else {
            let rows = buckets
                .into_iter()
                .map(|((name_index, _), (frequency, ids))| MatchCount {
                    name_index,
                    frequency,
                    unique_count: ids.len() as u64,
                })
                .collect();
            Ok(MatchRows::Aggregate(rows))
        }
    }

    async fn top_entities(&self, plan: &RankingPlan) -> Result<Vec<EntityCount>, StorageError> {
        let mut counts: HashMap<&str, (u64, HashSet<i64>)> = HashMap::new();
        for posting in self.in_window(&plan.window) {
            for name in posting.entity_names(plan.entity_kind) {
                let entry = counts.entry(name).or_default();
                entry.0 += 1;
                entry.1.insert(posting.job_id);
            }
        }
        let mut rows: Vec<EntityCount> = counts
            .into_iter()
            .filter(|(_, (frequency, _))| *frequency >= plan.min_frequency)
            .map(|(name, (frequency, ids))| EntityCount {
                name: name.to_string(),
                frequency,
                unique_count: ids.len() as u64,
            })
            .collect();
        rows.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.name.cmp(&b.name)));
        rows.truncate(plan.limit);
        Ok(rows)
    }

    async fn recent_postings(&self, limit: usize) -> Result<Vec<JobPosting>, StorageError> {
        let mut postings: Vec<&JobPosting> = self.postings.iter().collect();
        postings.sort_by(|a, b| {
            b.posted_date
                .cmp(&a.posted_date)
                .then_with(|| b.job_id.cmp(&a.job_id))
        });
        Ok(postings.into_iter().take(limit).cloned().collect())
    }
}
