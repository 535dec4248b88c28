//! 时间窗口解析
//!
//! 关键字（all / 4w / 1m / 3m / 6m / 1y）或 "YYYY-MM-DD to YYYY-MM-DD" 解析为具体日期边界。
//! 解析是全函数：无法识别、日期非法或 start > end 一律退化为 all（无边界）。

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 工具 schema 中允许的关键字
pub const WINDOW_KEYWORDS: [&str; 6] = ["all", "4w", "1m", "3m", "6m", "1y"];

/// 自定义区间的格式（用于工具参数的 pattern 校验）
pub const CUSTOM_WINDOW_PATTERN: &str = r"^\d{4}-\d{2}-\d{2} to \d{4}-\d{2}-\d{2}$";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowKeyword {
    All,
    FourWeeks,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl WindowKeyword {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "4w" => Some(Self::FourWeeks),
            "1m" => Some(Self::OneMonth),
            "3m" => Some(Self::ThreeMonths),
            "6m" => Some(Self::SixMonths),
            "1y" => Some(Self::OneYear),
            _ => None,
        }
    }

    /// 回看天数；All 为 None
    pub fn days_back(&self) -> Option<i64> {
        match self {
            Self::All => None,
            Self::FourWeeks => Some(28),
            Self::OneMonth => Some(30),
            Self::ThreeMonths => Some(90),
            Self::SixMonths => Some(180),
            Self::OneYear => Some(365),
        }
    }
}

/// 调用方给出的窗口描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowDescriptor {
    Keyword(WindowKeyword),
    Custom { start: NaiveDate, end: NaiveDate },
}

impl WindowDescriptor {
    /// 从字符串解析；任何无法识别的输入都得到 Keyword(All)
    pub fn parse(raw: &str) -> Self {
        if let Some(keyword) = WindowKeyword::parse(raw) {
            return Self::Keyword(keyword);
        }
        let parsed = raw.split_once(" to ").and_then(|(start, end)| {
            let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d").ok()?;
            let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").ok()?;
            Some((start, end))
        });
        match parsed {
            Some((start, end)) if start <= end => Self::Custom { start, end },
            _ => Self::Keyword(WindowKeyword::All),
        }
    }
}

/// 解析后的窗口；任一侧为 None 表示该侧无边界
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ResolvedWindow {
    pub const fn all() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn bounded(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start.map_or(true, |s| day >= s) && self.end.map_or(true, |e| day <= e)
    }

    /// 供叙述文本使用的标签
    pub fn label(&self) -> String {
        match (self.start, self.end) {
            (None, None) => "all time".to_string(),
            (Some(s), Some(e)) => format!("{} to {}", s, e),
            (Some(s), None) => format!("since {}", s),
            (None, Some(e)) => format!("until {}", e),
        }
    }
}

/// 时间源：系统时钟或冻结日期（测试用）
#[derive(Clone, Copy, Debug)]
enum Clock {
    System,
    Fixed(NaiveDate),
}

/// 窗口解析器：resolve 是 (descriptor, today) 的纯函数
#[derive(Clone, Copy, Debug)]
pub struct TimeWindowResolver {
    clock: Clock,
}

impl Default for TimeWindowResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeWindowResolver {
    pub fn new() -> Self {
        Self {
            clock: Clock::System,
        }
    }

    /// 冻结"今天"
    pub fn frozen(today: NaiveDate) -> Self {
        Self {
            clock: Clock::Fixed(today),
        }
    }

    pub fn today(&self) -> NaiveDate {
        match self.clock {
            Clock::System => Utc::now().date_naive(),
            Clock::Fixed(d) => d,
        }
    }

    pub fn resolve(&self, descriptor: &str) -> ResolvedWindow {
        self.resolve_descriptor(&WindowDescriptor::parse(descriptor))
    }

    /// 缺省描述（None）等同 all
    pub fn resolve_opt(&self, descriptor: Option<&str>) -> ResolvedWindow {
        descriptor.map_or(ResolvedWindow::all(), |d| self.resolve(d))
    }

    pub fn resolve_descriptor(&self, descriptor: &WindowDescriptor) -> ResolvedWindow {
        match descriptor {
            WindowDescriptor::Keyword(keyword) => match keyword.days_back() {
                None => ResolvedWindow::all(),
                Some(days) => {
                    let today = self.today();
                    ResolvedWindow::bounded(today - Duration::days(days), today)
                }
            },
            WindowDescriptor::Custom { start, end } => ResolvedWindow::bounded(*start, *end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TimeWindowResolver {
        TimeWindowResolver::frozen(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap())
    }

    #[test]
    fn test_keywords_are_ordered_or_unbounded() {
        let r = resolver();
        for keyword in WINDOW_KEYWORDS {
            let w = r.resolve(keyword);
            match (w.start, w.end) {
                (Some(s), Some(e)) => assert!(s <= e, "{keyword}"),
                (None, None) => {}
                _ => panic!("half-open window for {keyword}"),
            }
        }
    }

    #[test]
    fn test_three_months_is_ninety_days() {
        let w = resolver().resolve("3m");
        assert_eq!(w.end, NaiveDate::from_ymd_opt(2024, 6, 30));
        assert_eq!(w.start, NaiveDate::from_ymd_opt(2024, 4, 1));
    }

    #[test]
    fn test_four_weeks_is_twenty_eight_days() {
        let w = resolver().resolve("4W");
        assert_eq!(w.start, NaiveDate::from_ymd_opt(2024, 6, 2));
    }

    #[test]
    fn test_reversed_custom_range_falls_back_to_all() {
        let r = resolver();
        assert_eq!(r.resolve("2099-01-01 to 2000-01-01"), r.resolve("all"));
    }

    #[test]
    fn test_invalid_custom_dates_fall_back_to_all() {
        let r = resolver();
        assert_eq!(r.resolve("2024-02-30 to 2024-03-01"), ResolvedWindow::all());
        assert_eq!(r.resolve("last quarter"), ResolvedWindow::all());
        assert_eq!(r.resolve(""), ResolvedWindow::all());
    }

    #[test]
    fn test_custom_range_is_kept() {
        let w = resolver().resolve("2024-01-01 to 2024-03-31");
        assert_eq!(w.label(), "2024-01-01 to 2024-03-31");
        assert!(w.contains(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()));
        assert!(!w.contains(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()));
    }

    #[test]
    fn test_missing_descriptor_is_all() {
        assert!(resolver().resolve_opt(None).is_unbounded());
    }
}
