//! 图表产物
//!
//! ChartRenderer 接收一个 AnalyticsResult 或 RankingResult，返回产物路径。JsonChartWriter 输出声明式图表描述
//! （聚合结果与排行榜为柱状图，日序列为多折线图），先写同目录临时文件再 rename，读者永远看不到半写文件。

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::analytics::{AnalyticsResult, EntityKind, Granularity, RankingResult};
use crate::core::AgentError;

#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(&self, result: &AnalyticsResult, title: &str) -> Result<PathBuf, AgentError>;

    /// 排行榜柱状图
    async fn render_ranking(
        &self,
        ranking: &RankingResult,
        title: &str,
    ) -> Result<PathBuf, AgentError>;
}

/// 需求图表标题，如 `Skill demand: Python, React`
pub fn demand_chart_title(kind: EntityKind, granularity: Granularity, names: &[String]) -> String {
    let what = match (kind, granularity) {
        (EntityKind::Skill, Granularity::Aggregate) => "Skill demand",
        (EntityKind::JobRole, Granularity::Aggregate) => "Job role demand",
        (EntityKind::Skill, Granularity::DailySeries) => "Skill demand trend",
        (EntityKind::JobRole, Granularity::DailySeries) => "Job role demand trend",
    };
    format!("{what}: {}", names.join(", "))
}

#[derive(Clone, Debug)]
pub struct JsonChartWriter {
    output_dir: PathBuf,
}

impl JsonChartWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// 标题转文件名片段：小写字母数字，其余折叠为单个 '-'
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "chart".to_string()
    } else {
        slug.chars().take(48).collect()
    }
}

/// 由结果生成图表描述；柱状图按 rows 顺序（频次降序），折线图按 series 顺序（输入顺序）
pub fn chart_spec(result: &AnalyticsResult, title: &str) -> Value {
    match result.granularity {
        Granularity::Aggregate => json!({
            "kind": "bar",
            "title": title,
            "x_label": result.entity_kind.label(),
            "y_label": "postings",
            "categories": result.rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "values": result.rows.iter().map(|r| r.frequency).collect::<Vec<_>>(),
            "percentages": result.rows.iter().map(|r| r.percentage).collect::<Vec<_>>(),
            "window": result.summary.window.label(),
        }),
        Granularity::DailySeries => json!({
            "kind": "line",
            "title": title,
            "x_label": "date",
            "y_label": "postings",
            "x": result.buckets.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect::<Vec<_>>(),
            "series": result.series.iter().map(|s| json!({
                "name": s.name,
                "values": s.counts,
            })).collect::<Vec<_>>(),
        }),
    }
}

/// 排行榜图表描述，按 rows 顺序（频次降序）
pub fn ranking_chart_spec(ranking: &RankingResult, title: &str) -> Value {
    json!({
        "kind": "bar",
        "title": title,
        "x_label": ranking.entity_kind.label(),
        "y_label": "postings",
        "categories": ranking.rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        "values": ranking.rows.iter().map(|r| r.frequency).collect::<Vec<_>>(),
        "percentages": ranking.rows.iter().map(|r| r.percentage).collect::<Vec<_>>(),
        "window": ranking.summary.window.label(),
    })
}

fn write_atomically(dir: &Path, file_name: &str, body: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let target = dir.join(file_name);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| e.error)?;
    Ok(target)
}

impl JsonChartWriter {
    async fn write_spec(&self, spec: Value, title: &str) -> Result<PathBuf, AgentError> {
        let body = serde_json::to_vec_pretty(&spec)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("chart encoding failed: {e}")))?;
        let file_name = format!("{}-{}.chart.json", slugify(title), uuid::Uuid::new_v4().simple());
        let dir = self.output_dir.clone();

        let path = tokio::task::spawn_blocking(move || write_atomically(&dir, &file_name, &body))
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("chart writer task failed: {e}")))?
            .map_err(|e| AgentError::ToolExecutionFailed(format!("chart write failed: {e}")))?;

        tracing::debug!(path = %path.display(), "chart written");
        Ok(path)
    }
}

#[async_trait]
impl ChartRenderer for JsonChartWriter {
    async fn render(&self, result: &AnalyticsResult, title: &str) -> Result<PathBuf, AgentError> {
        self.write_spec(chart_spec(result, title), title).await
    }

    async fn render_ranking(
        &self,
        ranking: &RankingResult,
        title: &str,
    ) -> Result<PathBuf, AgentError> {
        self.write_spec(ranking_chart_spec(ranking, title), title).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{
        AnalyticsStatus, AnalyticsSummary, DemandRow, EntityKind, ResolvedWindow,
    };

    fn result() -> AnalyticsResult {
        AnalyticsResult {
            entity_kind: EntityKind::Skill,
            granularity: Granularity::Aggregate,
            rows: vec![DemandRow {
                name: "Python".into(),
                frequency: 40,
                unique_count: 40,
                percentage: 20.0,
            }],
            buckets: Vec::new(),
            series: Vec::new(),
            summary: AnalyticsSummary {
                total_matched: 40,
                total_universe: 200,
                window: ResolvedWindow::all(),
                message: "Python leads".into(),
                top_name: Some("Python".into()),
            },
            status: AnalyticsStatus::Ok,
            requested: vec!["Python".into()],
        }
    }

    #[test]
    fn test_demand_title_names_kind_and_entities() {
        let names = vec!["Python".to_string(), "React".to_string()];
        assert_eq!(
            demand_chart_title(EntityKind::Skill, Granularity::Aggregate, &names),
            "Skill demand: Python, React"
        );
        assert_eq!(
            demand_chart_title(EntityKind::JobRole, Granularity::DailySeries, &names[..1]),
            "Job role demand trend: Python"
        );
    }

    #[tokio::test]
    async fn test_render_ranking_writes_bar_chart() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonChartWriter::new(dir.path());
        let source = result();
        let ranking = RankingResult {
            entity_kind: EntityKind::Skill,
            rows: source.rows.clone(),
            categories: Vec::new(),
            summary: source.summary.clone(),
            status: AnalyticsStatus::Ok,
        };
        let path = writer.render_ranking(&ranking, "Top skills").await.unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("top-skills-"));
        let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["kind"], "bar");
        assert_eq!(written["values"][0], 40);
        assert_eq!(written["window"], "all time");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Skill Demand: Python & React"), "skill-demand-python-react");
        assert_eq!(slugify("!!!"), "chart");
    }

    #[tokio::test]
    async fn test_render_writes_complete_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonChartWriter::new(dir.path().join("charts"));
        let path = writer.render(&result(), "Skill demand").await.unwrap();

        assert!(path.starts_with(writer.output_dir()));
        let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["kind"], "bar");
        assert_eq!(written["categories"][0], "Python");
        // 目录里只剩最终文件，没有临时文件
        let entries = std::fs::read_dir(writer.output_dir()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
