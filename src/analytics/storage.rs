//! 存储协作者接口
//!
//! 引擎只依赖 DemandStore：宇宙计数、按名称匹配计数、Top N；职位推荐另外读取最新职位。
//! 实现方负责自身的连接池与语句超时。

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::analytics::{EntityKind, JobPosting, QueryPlan, RankingPlan, ResolvedWindow};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query timed out: {0}")]
    Timeout(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("malformed plan: {0}")]
    MalformedPlan(String),
}

/// 聚合匹配结果；name_index 指向 QueryPlan::names
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchCount {
    pub name_index: usize,
    pub frequency: u64,
    pub unique_count: u64,
}

/// 日序列匹配结果（只包含有数据的日子，缺失日由引擎补零）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DailyCount {
    pub name_index: usize,
    pub day: NaiveDate,
    pub frequency: u64,
    pub unique_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchRows {
    Aggregate(Vec<MatchCount>),
    Daily(Vec<DailyCount>),
}

/// Top N 的一行（按存储中的实体名分组）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityCount {
    pub name: String,
    pub frequency: u64,
    pub unique_count: u64,
}

#[async_trait]
pub trait DemandStore: Send + Sync {
    /// 窗口内的去重职位数（不受名称过滤影响），作为百分比分母
    async fn count_universe(
        &self,
        kind: EntityKind,
        window: &ResolvedWindow,
    ) -> Result<u64, StorageError>;

    /// 按计划的名称模式与窗口计数；返回形态与 plan.granularity 一致
    async fn count_matches(&self, plan: &QueryPlan) -> Result<MatchRows, StorageError>;

    /// 窗口内出现次数最多的实体
    async fn top_entities(&self, plan: &RankingPlan) -> Result<Vec<EntityCount>, StorageError>;

    /// 最新的 limit 条职位（posted_date、job_id 均降序），带技能列表
    async fn recent_postings(&self, limit: usize) -> Result<Vec<JobPosting>, StorageError>;
}
