//! 需求分析引擎
//!
//! 每次 analyze 最多两条只读查询（宇宙计数 + 匹配计数），在引擎边界把存储失败转换为
//! status = error，调用方只会看到带标签的结果。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analytics::{
    categorize, CategoryGroup, DemandStore, EntityKind, Granularity, MatchRows, QueryPlan,
    RankingPlan, ResolvedWindow, StorageError,
};

/// 周环比使用的桶数
const WEEK_BUCKETS: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsStatus {
    Ok,
    NoData,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandRow {
    pub name: String,
    pub frequency: u64,
    pub unique_count: u64,
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_matched: u64,
    pub total_universe: u64,
    pub window: ResolvedWindow,
    /// 叙述用一句话，只由汇总数字生成
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_name: Option<String>,
}

/// 最近 7 天对比之前 7 天；growth_pct 为 None 表示上周为 0 而本周有数据（新出现）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTrend {
    pub current_week: u64,
    pub previous_week: u64,
    pub growth_pct: Option<f64>,
}

impl WeeklyTrend {
    pub fn from_counts(counts: &[u64]) -> Self {
        let n = counts.len();
        let current_week: u64 = counts[n.saturating_sub(WEEK_BUCKETS)..].iter().sum();
        let previous_week: u64 = counts
            [n.saturating_sub(2 * WEEK_BUCKETS)..n.saturating_sub(WEEK_BUCKETS)]
            .iter()
            .sum();
        let growth_pct = match (previous_week, current_week) {
            (0, 0) => Some(0.0),
            (0, _) => None,
            (prev, cur) => Some(round2((cur as f64 - prev as f64) / prev as f64 * 100.0)),
        };
        Self {
            current_week,
            previous_week,
            growth_pct,
        }
    }
}

/// 单个名称的日序列，counts 与 AnalyticsResult::buckets 一一对齐
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandSeries {
    pub name: String,
    pub counts: Vec<u64>,
    pub trend: WeeklyTrend,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    pub entity_kind: EntityKind,
    pub granularity: Granularity,
    /// 按 frequency 降序，同频按输入顺序
    pub rows: Vec<DemandRow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<NaiveDate>,
    /// 按输入顺序（图例顺序）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<DemandSeries>,
    pub summary: AnalyticsSummary,
    pub status: AnalyticsStatus,
    /// 规范化后的请求名称（输入顺序）
    pub requested: Vec<String>,
}

impl AnalyticsResult {
    /// 与规范化输入顺序对齐的行
    pub fn aligned_rows(&self) -> Vec<&DemandRow> {
        self.requested
            .iter()
            .filter_map(|name| self.rows.iter().find(|r| &r.name == name))
            .collect()
    }

    pub fn is_ok(&self) -> bool {
        self.status == AnalyticsStatus::Ok
    }

    fn failed(plan: &QueryPlan, err: &StorageError) -> Self {
        Self {
            entity_kind: plan.entity_kind,
            granularity: plan.granularity,
            rows: Vec::new(),
            buckets: Vec::new(),
            series: Vec::new(),
            summary: AnalyticsSummary {
                total_matched: 0,
                total_universe: 0,
                window: plan.window,
                message: format!(
                    "Storage failure while analyzing {} demand: {}",
                    plan.entity_kind.label(),
                    err
                ),
                top_name: None,
            },
            status: AnalyticsStatus::Error,
            requested: plan.display_names().into_iter().map(str::to_string).collect(),
        }
    }
}

/// 排行榜结果（Top N + 分类）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankingResult {
    pub entity_kind: EntityKind,
    pub rows: Vec<DemandRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryGroup>,
    pub summary: AnalyticsSummary,
    pub status: AnalyticsStatus,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percentage(frequency: u64, universe: u64) -> f64 {
    if universe == 0 {
        0.0
    } else {
        round2(frequency as f64 / universe as f64 * 100.0)
    }
}

/// 频次降序；sort_by 是稳定排序，同频保持原顺序
fn sort_by_frequency(rows: &mut [DemandRow]) {
    rows.sort_by(|a, b| b.frequency.cmp(&a.frequency));
}

fn summary_message(
    kind: EntityKind,
    rows: &[DemandRow],
    universe: u64,
    window: &ResolvedWindow,
    status: AnalyticsStatus,
) -> String {
    match (status, rows.first()) {
        (AnalyticsStatus::Ok, Some(top)) => format!(
            "{} leads {} demand with {} postings ({:.2}% of {}) for {}.",
            top.name,
            kind.label(),
            top.frequency,
            top.percentage,
            universe,
            window.label()
        ),
        _ => {
            let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
            if names.is_empty() {
                format!("No {} postings found for {}.", kind.label(), window.label())
            } else {
                format!("No postings matched {} for {}.", names.join(", "), window.label())
            }
        }
    }
}

#[derive(Clone)]
pub struct DemandAnalyticsEngine {
    store: Arc<dyn DemandStore>,
}

impl DemandAnalyticsEngine {
    pub fn new(store: Arc<dyn DemandStore>) -> Self {
        Self { store }
    }

    /// 执行查询计划；永不返回错误，存储失败体现为 status = error
    pub async fn analyze(&self, plan: &QueryPlan) -> AnalyticsResult {
        match self.try_analyze(plan).await {
            Ok(result) => {
                debug!(
                    kind = plan.entity_kind.label(),
                    names = plan.names.len(),
                    status = ?result.status,
                    universe = result.summary.total_universe,
                    "analysis finished"
                );
                result
            }
            Err(e) => {
                warn!(kind = plan.entity_kind.label(), error = %e, "analysis failed at storage");
                AnalyticsResult::failed(plan, &e)
            }
        }
    }

    async fn try_analyze(&self, plan: &QueryPlan) -> Result<AnalyticsResult, StorageError> {
        let universe = self
            .store
            .count_universe(plan.entity_kind, &plan.window)
            .await?;
        let matches = self.store.count_matches(plan).await?;

        let requested: Vec<String> = plan.display_names().into_iter().map(str::to_string).collect();
        let mut totals: Vec<(u64, u64)> = vec![(0, 0); plan.names.len()];
        let mut buckets = Vec::new();
        let mut series = Vec::new();

        match (plan.granularity, matches) {
            (Granularity::Aggregate, MatchRows::Aggregate(rows)) => {
                for row in rows {
                    let slot = totals.get_mut(row.name_index).ok_or_else(|| {
                        StorageError::MalformedPlan(format!("name index {} out of range", row.name_index))
                    })?;
                    slot.0 += row.frequency;
                    slot.1 += row.unique_count;
                }
            }
            (Granularity::DailySeries, MatchRows::Daily(rows)) => {
                let spec = plan.series.ok_or_else(|| {
                    StorageError::MalformedPlan("daily plan without series range".to_string())
                })?;
                buckets = spec.buckets();
                let position: HashMap<NaiveDate, usize> =
                    buckets.iter().enumerate().map(|(i, d)| (*d, i)).collect();
                let mut counts = vec![vec![0u64; buckets.len()]; plan.names.len()];
                for row in rows {
                    let slot = totals.get_mut(row.name_index).ok_or_else(|| {
                        StorageError::MalformedPlan(format!("name index {} out of range", row.name_index))
                    })?;
                    // 区间外的日子不计入
                    let Some(&day) = position.get(&row.day) else {
                        continue;
                    };
                    slot.0 += row.frequency;
                    slot.1 += row.unique_count;
                    counts[row.name_index][day] += row.frequency;
                }
                series = requested
                    .iter()
                    .zip(counts)
                    .map(|(name, counts)| DemandSeries {
                        name: name.clone(),
                        trend: WeeklyTrend::from_counts(&counts),
                        counts,
                    })
                    .collect();
            }
            (granularity, _) => {
                return Err(StorageError::MalformedPlan(format!(
                    "store returned rows of the wrong shape for {granularity:?}"
                )));
            }
        }

        let mut rows: Vec<DemandRow> = requested
            .iter()
            .zip(totals)
            .map(|(name, (frequency, unique_count))| DemandRow {
                name: name.clone(),
                frequency,
                unique_count,
                percentage: percentage(frequency, universe),
            })
            .collect();
        sort_by_frequency(&mut rows);

        let status = if rows.iter().all(|r| r.frequency == 0) {
            AnalyticsStatus::NoData
        } else {
            AnalyticsStatus::Ok
        };
        let total_matched = rows.iter().map(|r| r.frequency).sum();
        let message = summary_message(plan.entity_kind, &rows, universe, &plan.window, status);
        let top_name = (status == AnalyticsStatus::Ok)
            .then(|| rows.first().map(|r| r.name.clone()))
            .flatten();

        Ok(AnalyticsResult {
            entity_kind: plan.entity_kind,
            granularity: plan.granularity,
            rows,
            buckets,
            series,
            summary: AnalyticsSummary {
                total_matched,
                total_universe: universe,
                window: plan.window,
                message,
                top_name,
            },
            status,
            requested,
        })
    }

    /// 窗口内 Top N；技能维度附带分类
    pub async fn rank_top(&self, plan: &RankingPlan) -> RankingResult {
        let outcome = async {
            let universe = self
                .store
                .count_universe(plan.entity_kind, &plan.window)
                .await?;
            let top = self.store.top_entities(plan).await?;
            Ok::<_, StorageError>((universe, top))
        }
        .await;

        match outcome {
            Ok((universe, top)) => {
                let rows: Vec<DemandRow> = top
                    .into_iter()
                    .map(|e| DemandRow {
                        percentage: percentage(e.frequency, universe),
                        name: e.name,
                        frequency: e.frequency,
                        unique_count: e.unique_count,
                    })
                    .collect();
                let status = if rows.is_empty() {
                    AnalyticsStatus::NoData
                } else {
                    AnalyticsStatus::Ok
                };
                let categories = match plan.entity_kind {
                    EntityKind::Skill => {
                        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
                        categorize(&names)
                    }
                    EntityKind::JobRole => Vec::new(),
                };
                let message = summary_message(plan.entity_kind, &rows, universe, &plan.window, status);
                RankingResult {
                    entity_kind: plan.entity_kind,
                    summary: AnalyticsSummary {
                        total_matched: rows.iter().map(|r| r.frequency).sum(),
                        total_universe: universe,
                        window: plan.window,
                        message,
                        top_name: rows.first().map(|r| r.name.clone()),
                    },
                    rows,
                    categories,
                    status,
                }
            }
            Err(e) => {
                warn!(kind = plan.entity_kind.label(), error = %e, "ranking failed at storage");
                RankingResult {
                    entity_kind: plan.entity_kind,
                    rows: Vec::new(),
                    categories: Vec::new(),
                    summary: AnalyticsSummary {
                        total_matched: 0,
                        total_universe: 0,
                        window: plan.window,
                        message: format!(
                            "Storage failure while ranking {} demand: {}",
                            plan.entity_kind.label(),
                            e
                        ),
                        top_name: None,
                    },
                    status: AnalyticsStatus::Error,
                }
            }
        }
    }
}
