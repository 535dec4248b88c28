//! 需求分析层：时间窗口 → 查询计划 → 存储协作者 → 分析结果

pub mod category;
pub mod engine;
pub mod memory_store;
pub mod query;
pub mod recommend;
pub mod sqlite;
pub mod storage;
pub mod window;

pub use category::{categorize, categorize_skill, CategoryGroup, SkillCategory};
pub use engine::{
    AnalyticsResult, AnalyticsStatus, AnalyticsSummary, DemandAnalyticsEngine, DemandRow,
    DemandSeries, RankingResult, WeeklyTrend,
};
pub use memory_store::{InMemoryDemandStore, JobPosting};
pub use query::{
    normalize_names, EntityKind, Granularity, NamePattern, QueryBuilder, QueryPlan, RankingPlan,
    SeriesSpec, DEFAULT_SERIES_LOOKBACK_DAYS, MAX_RANKING_LIMIT, MAX_SERIES_LOOKBACK_DAYS,
};
pub use recommend::{
    JobRecommendation, JobRecommender, JobRequirements, DEFAULT_RECOMMENDATIONS,
    MAX_RECOMMENDATIONS, REQUIRED_PROFILE_FIELDS,
};
pub use sqlite::SqliteDemandStore;
pub use storage::{DailyCount, DemandStore, EntityCount, MatchCount, MatchRows, StorageError};
pub use window::{
    ResolvedWindow, TimeWindowResolver, WindowDescriptor, WindowKeyword, CUSTOM_WINDOW_PATTERN,
    WINDOW_KEYWORDS,
};
