//! 查询计划构建
//!
//! 名称规范化（trim、大小写不敏感去重、保留首次出现的写法与顺序）后生成 QueryPlan。
//! 名称只以绑定参数的形式携带（like_pattern），从不拼进 SQL 文本。

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::analytics::{ResolvedWindow, TimeWindowResolver};
use crate::core::AgentError;

/// 趋势图固定回看天数
pub const DEFAULT_SERIES_LOOKBACK_DAYS: u32 = 28;
/// 趋势图回看天数上限（一年）
pub const MAX_SERIES_LOOKBACK_DAYS: u32 = 366;
/// 排行榜最大条数
pub const MAX_RANKING_LIMIT: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Skill,
    JobRole,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Skill => "skill",
            EntityKind::JobRole => "job role",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Aggregate,
    DailySeries,
}

/// 单个名称及其匹配模式
///
/// 匹配语义：大小写不敏感的整词匹配，即 `" " + lower(candidate) + " "` 包含 `" " + token + " "`。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NamePattern {
    /// 规范化后保留的原始写法（图例名称）
    pub name: String,
    /// 小写后的 token
    pub token: String,
    /// SQL LIKE 模式（通配符已转义，配合 `ESCAPE '\'` 使用）
    pub like_pattern: String,
}

impl NamePattern {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let token = name.to_lowercase();
        let like_pattern = format!("% {} %", escape_like(&token));
        Self {
            name,
            token,
            like_pattern,
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let padded = format!(" {} ", candidate.to_lowercase());
        padded.contains(&format!(" {} ", self.token))
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 日序列的固定区间：从 start 起连续 days 天（含今天）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SeriesSpec {
    pub start: NaiveDate,
    pub days: u32,
}

impl SeriesSpec {
    pub fn buckets(&self) -> Vec<NaiveDate> {
        (0..self.days as i64)
            .map(|offset| self.start + Duration::days(offset))
            .collect()
    }

    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(self.days.saturating_sub(1) as i64)
    }
}

/// 聚合 / 日序列查询计划
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryPlan {
    pub entity_kind: EntityKind,
    pub names: Vec<NamePattern>,
    pub window: ResolvedWindow,
    pub granularity: Granularity,
    /// 仅 DailySeries 时存在；此时 window 等于该固定区间
    pub series: Option<SeriesSpec>,
}

impl QueryPlan {
    /// 交给存储层绑定的参数列表，与 names 一一对应
    pub fn bind_parameters(&self) -> Vec<&str> {
        self.names.iter().map(|n| n.like_pattern.as_str()).collect()
    }

    pub fn display_names(&self) -> Vec<&str> {
        self.names.iter().map(|n| n.name.as_str()).collect()
    }
}

/// 排行榜计划（Top N）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankingPlan {
    pub entity_kind: EntityKind,
    pub window: ResolvedWindow,
    pub limit: usize,
    pub min_frequency: u64,
}

/// trim、丢弃空白项、大小写不敏感去重（保留首次出现的写法与顺序）
pub fn normalize_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[derive(Clone, Debug)]
pub struct QueryBuilder {
    resolver: TimeWindowResolver,
    series_lookback_days: u32,
}

impl QueryBuilder {
    pub fn new(resolver: TimeWindowResolver, series_lookback_days: u32) -> Self {
        Self {
            resolver,
            series_lookback_days: series_lookback_days.clamp(1, MAX_SERIES_LOOKBACK_DAYS),
        }
    }

    pub fn build<S: AsRef<str>>(
        &self,
        entity_kind: EntityKind,
        names: &[S],
        window: ResolvedWindow,
        granularity: Granularity,
    ) -> Result<QueryPlan, AgentError> {
        let normalized = normalize_names(names);
        if normalized.is_empty() {
            return Err(AgentError::InvalidArgument(format!(
                "at least one non-blank {} name is required",
                entity_kind.label()
            )));
        }
        let names = normalized.into_iter().map(NamePattern::new).collect();

        let (window, series) = match granularity {
            Granularity::Aggregate => (window, None),
            Granularity::DailySeries => {
                let today = self.resolver.today();
                let spec = SeriesSpec {
                    start: today - Duration::days(self.series_lookback_days as i64 - 1),
                    days: self.series_lookback_days,
                };
                (ResolvedWindow::bounded(spec.start, spec.end()), Some(spec))
            }
        };

        Ok(QueryPlan {
            entity_kind,
            names,
            window,
            granularity,
            series,
        })
    }

    pub fn build_ranking(
        &self,
        entity_kind: EntityKind,
        window: ResolvedWindow,
        limit: usize,
        min_frequency: u64,
    ) -> Result<RankingPlan, AgentError> {
        if limit == 0 || limit > MAX_RANKING_LIMIT {
            return Err(AgentError::InvalidArgument(format!(
                "limit must be between 1 and {MAX_RANKING_LIMIT}, got {limit}"
            )));
        }
        Ok(RankingPlan {
            entity_kind,
            window,
            limit,
            min_frequency: min_frequency.max(1),
        })
    }
}
