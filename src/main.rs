//! skillpulse - 职位市场需求分析 Agent
//!
//! 入口：解析命令行、加载配置、初始化日志、打开数据集，然后直接调用分析引擎或跑一次完整编排循环。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use skillpulse::agent::{scripted_analysis_policy, AgentRuntime};
use skillpulse::analytics::{AnalyticsStatus, EntityKind, Granularity, MAX_RANKING_LIMIT};
use skillpulse::charts::demand_chart_title;
use skillpulse::config::load_config;
use skillpulse::protocol::AgentTask;
use skillpulse::tools::TOP_SKILLS_CHART_TITLE;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "skillpulse", version, about = "Job-market skill and role demand analytics")]
struct Cli {
    /// 额外的 TOML 配置文件（覆盖 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite 数据集路径（覆盖 [storage].db_path）
    #[arg(long, env = "SKILLPULSE_DB", global = true)]
    db: Option<PathBuf>,

    /// 输出 debug 日志
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// 技能或职位名称，二选一
#[derive(Args)]
struct NameArgs {
    /// 逗号分隔的技能名
    #[arg(long, value_delimiter = ',', conflicts_with = "roles")]
    skills: Vec<String>,

    /// 逗号分隔的职位名
    #[arg(long, value_delimiter = ',')]
    roles: Vec<String>,
}

impl NameArgs {
    fn kind_and_names(&self) -> anyhow::Result<(EntityKind, &[String])> {
        match (self.skills.is_empty(), self.roles.is_empty()) {
            (false, _) => Ok((EntityKind::Skill, &self.skills)),
            (true, false) => Ok((EntityKind::JobRole, &self.roles)),
            (true, true) => bail!("pass --skills or --roles"),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// 时间窗口内的聚合需求
    Analyze {
        #[command(flatten)]
        names: NameArgs,
        /// all / 4w / 1m / 3m / 6m / 1y / "YYYY-MM-DD to YYYY-MM-DD"
        #[arg(long)]
        window: Option<String>,
        /// 同时写出图表描述文件
        #[arg(long)]
        chart: bool,
    },
    /// 最近几周的日需求序列
    Trend {
        #[command(flatten)]
        names: NameArgs,
        #[arg(long)]
        chart: bool,
    },
    /// 需求最高的技能
    Top {
        #[arg(long)]
        window: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        chart: bool,
    },
    /// 按求职画像推荐职位；缺少必填字段时输出需要补充的字段
    Recommend {
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        position: Option<String>,
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,
        #[arg(long)]
        interests: Option<String>,
        #[arg(long)]
        job_description: Option<String>,
        #[arg(long)]
        other_requirements: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// 跑一次完整编排循环（固定策略：分析后结束）
    Ask {
        #[arg(long, value_delimiter = ',', required = true)]
        skills: Vec<String>,
        #[arg(long)]
        window: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        cfg.storage.db_path = db;
    }
    cfg.agent.verbose |= cli.verbose;
    skillpulse::observability::init(cfg.agent.verbose);

    let runtime = AgentRuntime::open(cfg).context("Failed to open job dataset")?;
    let ctx = runtime.context().clone();

    match cli.command {
        Command::Analyze { names, window, chart } => {
            let (kind, names) = names.kind_and_names()?;
            let window = ctx
                .resolver
                .resolve(window.as_deref().unwrap_or(&ctx.default_window));
            let plan = ctx.builder.build(kind, names, window, Granularity::Aggregate)?;
            let result = ctx.engine.analyze(&plan).await;
            if chart && result.is_ok() {
                if let Some(charts) = &ctx.charts {
                    let title = demand_chart_title(kind, Granularity::Aggregate, &result.requested);
                    let path = charts.render(&result, &title).await?;
                    eprintln!("chart written to {}", path.display());
                }
            }
            print_json(&result)?;
        }
        Command::Trend { names, chart } => {
            let (kind, names) = names.kind_and_names()?;
            let plan = ctx.builder.build(
                kind,
                names,
                skillpulse::analytics::ResolvedWindow::all(),
                Granularity::DailySeries,
            )?;
            let result = ctx.engine.analyze(&plan).await;
            if chart && result.is_ok() {
                if let Some(charts) = &ctx.charts {
                    let title = demand_chart_title(kind, Granularity::DailySeries, &result.requested);
                    let path = charts.render(&result, &title).await?;
                    eprintln!("chart written to {}", path.display());
                }
            }
            print_json(&result)?;
        }
        Command::Top { window, limit, chart } => {
            let window = ctx
                .resolver
                .resolve(window.as_deref().unwrap_or(&ctx.default_window));
            let limit = limit.unwrap_or(ctx.top_limit).min(MAX_RANKING_LIMIT);
            let plan = ctx
                .builder
                .build_ranking(EntityKind::Skill, window, limit, ctx.min_frequency)?;
            let ranking = ctx.engine.rank_top(&plan).await;
            if chart && ranking.status == AnalyticsStatus::Ok {
                if let Some(charts) = &ctx.charts {
                    let path = charts.render_ranking(&ranking, TOP_SKILLS_CHART_TITLE).await?;
                    eprintln!("chart written to {}", path.display());
                }
            }
            print_json(&ranking)?;
        }
        Command::Recommend {
            industry,
            position,
            skills,
            interests,
            job_description,
            other_requirements,
            limit,
        } => {
            let mut args = serde_json::json!({
                "industry": industry,
                "position": position,
                "skills": skills,
                "interests": interests,
                "job_description": job_description,
                "other_requirements": other_requirements,
                "limit": limit,
            });
            if let Some(obj) = args.as_object_mut() {
                obj.retain(|_, v| !v.is_null());
            }
            let result = runtime.executor().execute("recommend_jobs", args).await;
            print_json(&result.output)?;
        }
        Command::Ask { skills, window } => {
            let policy = scripted_analysis_policy(&skills, window.as_deref());
            let task = AgentTask::from_query(format!("How strong is the demand for {}?", skills.join(", ")));

            let cancel_token = CancellationToken::new();
            let ctrl_c_token = cancel_token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c_token.cancel();
                }
            });

            let output = runtime
                .handle_task(&task, Arc::new(policy), &cancel_token, None)
                .await?;
            print_json(&output)?;
        }
    }

    Ok(())
}
