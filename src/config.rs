//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SKILLPULSE__*` 覆盖（双下划线表示嵌套，如 `SKILLPULSE__AGENT__MAX_TOOL_CALLS=5`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::analytics::{
    WindowDescriptor, WindowKeyword, DEFAULT_RECOMMENDATIONS, DEFAULT_SERIES_LOOKBACK_DAYS,
    MAX_RANKING_LIMIT, MAX_RECOMMENDATIONS, MAX_SERIES_LOOKBACK_DAYS,
};
use crate::llm::HashingEmbedder;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub storage: StorageSection,
    pub analytics: AnalyticsSection,
    pub charts: ChartsSection,
    pub recommend: RecommendSection,
}

/// [agent] 段：预算、默认窗口、超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单次请求的工具调用上限
    pub max_tool_calls: usize,
    /// 工具参数缺省 window 时使用
    pub default_window: String,
    pub verbose: bool,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 单次决策超时（秒）
    pub decision_timeout_secs: u64,
    pub max_decision_failures: usize,
    pub max_concurrent_tools: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_tool_calls: 10,
            default_window: "4w".to_string(),
            verbose: false,
            tool_timeout_secs: 30,
            decision_timeout_secs: 60,
            max_decision_failures: 3,
            max_concurrent_tools: 4,
        }
    }
}

/// [storage] 段：SQLite 数据集路径
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub db_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/jobs.db"),
        }
    }
}

/// [analytics] 段：日序列回看天数、排行默认值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsSection {
    pub series_lookback_days: u32,
    pub top_limit: usize,
    pub min_frequency: u64,
}

impl Default for AnalyticsSection {
    fn default() -> Self {
        Self {
            series_lookback_days: DEFAULT_SERIES_LOOKBACK_DAYS,
            top_limit: 20,
            min_frequency: 2,
        }
    }
}

/// [charts] 段：图表产物目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChartsSection {
    pub output_dir: PathBuf,
}

impl Default for ChartsSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("charts"),
        }
    }
}

/// [recommend] 段：职位推荐的嵌入提供方与候选规模
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendSection {
    /// hashing（本地）或 openai
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 为空时读 OPENAI_API_KEY
    pub api_key: Option<String>,
    /// hashing 向量维度
    pub dims: usize,
    pub default_limit: usize,
    /// 参与排序的最新职位数
    pub max_candidates: usize,
}

impl Default for RecommendSection {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "text-embedding-3-small".to_string(),
            base_url: None,
            api_key: None,
            dims: HashingEmbedder::DEFAULT_DIMS,
            default_limit: DEFAULT_RECOMMENDATIONS,
            max_candidates: 2000,
        }
    }
}

impl AppConfig {
    /// 规范化取值；未知的 default_window 仍照常解析（等同 all），只记一条警告
    pub fn normalized(mut self) -> Self {
        let window = &self.agent.default_window;
        if WindowKeyword::parse(window).is_none()
            && !matches!(WindowDescriptor::parse(window), WindowDescriptor::Custom { .. })
        {
            tracing::warn!(
                default_window = %self.agent.default_window,
                "unknown default_window; it will resolve to the full dataset"
            );
        }
        self.agent.max_concurrent_tools = self.agent.max_concurrent_tools.max(1);
        self.analytics.series_lookback_days =
            self.analytics.series_lookback_days.clamp(1, MAX_SERIES_LOOKBACK_DAYS);
        self.analytics.top_limit = self.analytics.top_limit.clamp(1, MAX_RANKING_LIMIT);
        self.analytics.min_frequency = self.analytics.min_frequency.max(1);
        self.recommend.default_limit = self.recommend.default_limit.clamp(1, MAX_RECOMMENDATIONS);
        self.recommend.max_candidates = self.recommend.max_candidates.max(1);
        self
    }
}

/// 从 config 目录加载配置，环境变量 SKILLPULSE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SKILLPULSE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, skipped");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SKILLPULSE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let cfg: AppConfig = c.try_deserialize()?;
    Ok(cfg.normalized())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_tool_calls, 10);
        assert_eq!(cfg.agent.default_window, "4w");
        assert_eq!(cfg.analytics.series_lookback_days, 28);
        assert_eq!(cfg.storage.db_path, PathBuf::from("data/jobs.db"));
        assert_eq!(cfg.charts.output_dir, PathBuf::from("charts"));
        assert_eq!(cfg.recommend.provider, "hashing");
        assert_eq!(cfg.recommend.default_limit, 5);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[agent]\nmax_tool_calls = 4\ndefault_window = \"3m\"\n\n[analytics]\ntop_limit = 500"
        )
        .unwrap();
        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.agent.max_tool_calls, 4);
        assert_eq!(cfg.agent.default_window, "3m");
        // 未给出的键保留默认值
        assert_eq!(cfg.agent.max_decision_failures, 3);
        assert_eq!(cfg.analytics.top_limit, MAX_RANKING_LIMIT);
    }

    #[test]
    fn test_unknown_default_window_is_kept() {
        let mut cfg = AppConfig::default();
        cfg.agent.default_window = "fortnight".into();
        let cfg = cfg.normalized();
        assert_eq!(cfg.agent.default_window, "fortnight");
    }

    #[test]
    fn test_series_lookback_is_clamped() {
        let mut cfg = AppConfig::default();
        cfg.analytics.series_lookback_days = 100_000;
        assert_eq!(cfg.normalized().analytics.series_lookback_days, MAX_SERIES_LOOKBACK_DAYS);
        let mut cfg = AppConfig::default();
        cfg.analytics.series_lookback_days = 0;
        assert_eq!(cfg.normalized().analytics.series_lookback_days, 1);
    }
}
