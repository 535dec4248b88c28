//! SQLite 版 DemandStore（rusqlite，同步驱动经 spawn_blocking 调用）
//!
//! 表结构：job(job_id, title, job_expertise, posted_date) / skill(skill_id, name) / job_skill(job_id, skill_id)。
//! 所有过滤条件都是绑定参数；SQL 文本只按名称个数生成占位符编号。
//! 名称匹配用连接上注册的 `unicode_lower`（Rust `to_lowercase`），与内存实现的折叠规则一致；
//! SQLite 内置 `lower()` / `LIKE` 只折叠 ASCII。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};

use crate::analytics::{
    DailyCount, DemandStore, EntityCount, EntityKind, Granularity, JobPosting, MatchCount,
    MatchRows, QueryPlan, RankingPlan, ResolvedWindow, StorageError,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS job (
    job_id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    job_expertise TEXT,
    posted_date TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS skill (
    skill_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS job_skill (
    job_id INTEGER NOT NULL REFERENCES job(job_id) ON DELETE CASCADE,
    skill_id INTEGER NOT NULL REFERENCES skill(skill_id) ON DELETE CASCADE,
    PRIMARY KEY (job_id, skill_id)
);
CREATE INDEX IF NOT EXISTS idx_job_posted_date ON job(posted_date);
";

/// group_concat 拼接技能名用的分隔符（char(31)）
const SKILL_SEPARATOR: char = '\u{1f}';

/// 窗口条件，占用 ?1 / ?2
const WINDOW_FILTER: &str = "(?1 IS NULL OR date(j.posted_date) >= ?1) \
     AND (?2 IS NULL OR date(j.posted_date) <= ?2)";

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StorageError::Timeout(e.to_string())
                }
                rusqlite::ErrorCode::CannotOpen => StorageError::Connection(e.to_string()),
                _ => StorageError::Query(e.to_string()),
            },
            _ => StorageError::Query(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct SqliteDemandStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDemandStore {
    /// 打开（或创建）数据库文件并初始化表；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| StorageError::Connection(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::Connection(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        register_unicode_lower(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 批量写入职位（单事务）；返回写入条数
    pub fn insert_postings(&self, postings: &[JobPosting]) -> Result<usize, StorageError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StorageError::Connection("connection mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        for posting in postings {
            tx.execute(
                "INSERT OR REPLACE INTO job (job_id, title, job_expertise, posted_date) VALUES (?1, ?2, ?3, ?4)",
                params![posting.job_id, posting.title, posting.job_expertise, posting.posted_date],
            )?;
            for skill in &posting.skills {
                tx.execute("INSERT OR IGNORE INTO skill (name) VALUES (?1)", params![skill])?;
                tx.execute(
                    "INSERT OR IGNORE INTO job_skill (job_id, skill_id)
                     SELECT ?1, skill_id FROM skill WHERE name = ?2",
                    params![posting.job_id, skill],
                )?;
            }
        }
        tx.commit()?;
        Ok(postings.len())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StorageError::Connection("connection mutex poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Connection(format!("blocking task failed: {e}")))?
    }
}

/// 注册 `unicode_lower(text)`；NULL 原样返回
fn register_unicode_lower(conn: &Connection) -> Result<(), StorageError> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )?;
    Ok(())
}

fn window_params(window: &ResolvedWindow) -> Vec<SqlValue> {
    let as_sql = |d: Option<NaiveDate>| match d {
        Some(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        None => SqlValue::Null,
    };
    vec![as_sql(window.start), as_sql(window.end)]
}

/// `WITH wanted(idx, pattern) AS (VALUES (?3, ?4), (?5, ?6), ...)` 及其参数
fn wanted_cte(plan: &QueryPlan, params: &mut Vec<SqlValue>) -> String {
    let rows: Vec<String> = plan
        .names
        .iter()
        .enumerate()
        .map(|(idx, pattern)| {
            params.push(SqlValue::Integer(idx as i64));
            params.push(SqlValue::Text(pattern.like_pattern.clone()));
            format!("(?{}, ?{})", params.len() - 1, params.len())
        })
        .collect();
    format!("WITH wanted(idx, pattern) AS (VALUES {})", rows.join(", "))
}

fn match_source(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Skill => {
            "FROM wanted w
             JOIN skill s ON (' ' || unicode_lower(s.name) || ' ') LIKE w.pattern ESCAPE '\\'
             JOIN job_skill js ON js.skill_id = s.skill_id
             JOIN job j ON j.job_id = js.job_id"
        }
        EntityKind::JobRole => {
            "FROM wanted w
             JOIN job j ON (' ' || unicode_lower(j.job_expertise) || ' ') LIKE w.pattern ESCAPE '\\'"
        }
    }
}

fn count_u64(raw: i64) -> u64 {
    raw.max(0) as u64
}

#[async_trait]
impl DemandStore for SqliteDemandStore {
    async fn count_universe(
        &self,
        kind: EntityKind,
        window: &ResolvedWindow,
    ) -> Result<u64, StorageError> {
        let sql = match kind {
            EntityKind::Skill => format!(
                "SELECT COUNT(DISTINCT j.job_id) FROM job j
                 JOIN job_skill js ON js.job_id = j.job_id
                 WHERE {WINDOW_FILTER}"
            ),
            EntityKind::JobRole => {
                format!("SELECT COUNT(DISTINCT j.job_id) FROM job j WHERE {WINDOW_FILTER}")
            }
        };
        let params = window_params(window);
        self.with_conn(move |conn| {
            let total: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
            Ok(count_u64(total))
        })
        .await
    }

    async fn count_matches(&self, plan: &QueryPlan) -> Result<MatchRows, StorageError> {
        if plan.names.is_empty() {
            return Err(StorageError::MalformedPlan("plan has no names".to_string()));
        }
        let mut params = window_params(&plan.window);
        let cte = wanted_cte(plan, &mut params);
        let source = match_source(plan.entity_kind);
        let mention = match plan.entity_kind {
            EntityKind::Skill => "js.job_id",
            EntityKind::JobRole => "j.job_id",
        };

        match plan.granularity {
            Granularity::Aggregate => {
                let sql = format!(
                    "{cte}
                     SELECT w.idx, COUNT({mention}), COUNT(DISTINCT j.job_id)
                     {source}
                     WHERE {WINDOW_FILTER}
                     GROUP BY w.idx
                     ORDER BY w.idx"
                );
                self.with_conn(move |conn| {
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt
                        .query_map(params_from_iter(params), |row| {
                            Ok(MatchCount {
                                name_index: row.get::<_, i64>(0)? as usize,
                                frequency: count_u64(row.get(1)?),
                                unique_count: count_u64(row.get(2)?),
                            })
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(MatchRows::Aggregate(rows))
                })
                .await
            }
            Granularity::DailySeries => {
                let sql = format!(
                    "{cte}
                     SELECT w.idx, date(j.posted_date) AS day, COUNT({mention}), COUNT(DISTINCT j.job_id)
                     {source}
                     WHERE {WINDOW_FILTER}
                     GROUP BY w.idx, day
                     ORDER BY day, w.idx"
                );
                self.with_conn(move |conn| {
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt
                        .query_map(params_from_iter(params), |row| {
                            Ok(DailyCount {
                                name_index: row.get::<_, i64>(0)? as usize,
                                day: row.get(1)?,
                                frequency: count_u64(row.get(2)?),
                                unique_count: count_u64(row.get(3)?),
                            })
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(MatchRows::Daily(rows))
                })
                .await
            }
        }
    }

    async fn top_entities(&self, plan: &RankingPlan) -> Result<Vec<EntityCount>, StorageError> {
        let sql = match plan.entity_kind {
            EntityKind::Skill => format!(
                "SELECT s.name, COUNT(js.job_id) AS frequency, COUNT(DISTINCT js.job_id)
                 FROM skill s
                 JOIN job_skill js ON js.skill_id = s.skill_id
                 JOIN job j ON j.job_id = js.job_id
                 WHERE {WINDOW_FILTER}
                 GROUP BY s.name
                 HAVING COUNT(js.job_id) >= ?3
                 ORDER BY frequency DESC, s.name ASC
                 LIMIT ?4"
            ),
            EntityKind::JobRole => format!(
                "SELECT j.job_expertise, COUNT(j.job_id) AS frequency, COUNT(DISTINCT j.job_id)
                 FROM job j
                 WHERE j.job_expertise IS NOT NULL AND {WINDOW_FILTER}
                 GROUP BY j.job_expertise
                 HAVING COUNT(j.job_id) >= ?3
                 ORDER BY frequency DESC, j.job_expertise ASC
                 LIMIT ?4"
            ),
        };
        let mut params = window_params(&plan.window);
        params.push(SqlValue::Integer(plan.min_frequency as i64));
        params.push(SqlValue::Integer(plan.limit as i64));
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| {
                    Ok(EntityCount {
                        name: row.get(0)?,
                        frequency: count_u64(row.get(1)?),
                        unique_count: count_u64(row.get(2)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn recent_postings(&self, limit: usize) -> Result<Vec<JobPosting>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT j.job_id, j.title, j.job_expertise, j.posted_date,
                        (SELECT group_concat(name, char(31)) FROM (
                            SELECT s.name FROM job_skill js
                            JOIN skill s ON s.skill_id = js.skill_id
                            WHERE js.job_id = j.job_id
                            ORDER BY js.rowid))
                 FROM job j
                 ORDER BY date(j.posted_date) DESC, j.job_id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    let skills: Option<String> = row.get(4)?;
                    Ok(JobPosting {
                        job_id: row.get(0)?,
                        title: row.get(1)?,
                        job_expertise: row.get(2)?,
                        posted_date: row.get(3)?,
                        skills: skills
                            .map(|joined| joined.split(SKILL_SEPARATOR).map(str::to_string).collect())
                            .unwrap_or_default(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{QueryBuilder, TimeWindowResolver};

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn seeded() -> SqliteDemandStore {
        let store = SqliteDemandStore::open_in_memory().unwrap();
        store
            .insert_postings(&[
                JobPosting::new(1, "Backend", day(6, 1))
                    .with_expertise("Backend Developer")
                    .with_skills(["Python", "SQL"]),
                JobPosting::new(2, "Frontend", day(6, 2))
                    .with_expertise("Frontend Developer")
                    .with_skills(["React", "JavaScript"]),
                JobPosting::new(3, "Data", day(1, 15))
                    .with_expertise("Data Scientist")
                    .with_skills(["python", "Machine Learning"]),
                JobPosting::new(4, "Untagged", day(6, 3)),
            ])
            .unwrap();
        store
    }

    fn builder() -> QueryBuilder {
        QueryBuilder::new(TimeWindowResolver::frozen(day(6, 30)), 28)
    }

    #[tokio::test]
    async fn test_universe_respects_window_and_entity_kind() {
        let store = seeded();
        let june = ResolvedWindow::bounded(day(6, 1), day(6, 30));
        assert_eq!(store.count_universe(EntityKind::Skill, &june).await.unwrap(), 2);
        assert_eq!(store.count_universe(EntityKind::JobRole, &june).await.unwrap(), 3);
        assert_eq!(
            store.count_universe(EntityKind::Skill, &ResolvedWindow::all()).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_matches_are_case_insensitive_whole_token() {
        let store = seeded();
        let plan = builder()
            .build(
                EntityKind::Skill,
                &["PYTHON", "Java", "React"],
                ResolvedWindow::all(),
                Granularity::Aggregate,
            )
            .unwrap();
        let rows = store.count_matches(&plan).await.unwrap();
        // Java 不应命中 JavaScript
        assert_eq!(
            rows,
            MatchRows::Aggregate(vec![
                MatchCount { name_index: 0, frequency: 2, unique_count: 2 },
                MatchCount { name_index: 2, frequency: 1, unique_count: 1 },
            ])
        );
    }

    #[tokio::test]
    async fn test_non_ascii_names_fold_like_rust() {
        let store = SqliteDemandStore::open_in_memory().unwrap();
        store
            .insert_postings(&[
                JobPosting::new(1, "Phoenix", day(6, 1))
                    .with_expertise("Ingénieur Logiciel")
                    .with_skills(["Élixir"]),
                JobPosting::new(2, "Phoenix", day(6, 2))
                    .with_expertise("INGÉNIEUR LOGICIEL")
                    .with_skills(["élixir"]),
            ])
            .unwrap();
        let plan = builder()
            .build(EntityKind::Skill, &["ÉLIXIR"], ResolvedWindow::all(), Granularity::Aggregate)
            .unwrap();
        assert_eq!(
            store.count_matches(&plan).await.unwrap(),
            MatchRows::Aggregate(vec![MatchCount { name_index: 0, frequency: 2, unique_count: 2 }])
        );
        let plan = builder()
            .build(EntityKind::JobRole, &["ingénieur"], ResolvedWindow::all(), Granularity::Aggregate)
            .unwrap();
        assert_eq!(
            store.count_matches(&plan).await.unwrap(),
            MatchRows::Aggregate(vec![MatchCount { name_index: 0, frequency: 2, unique_count: 2 }])
        );
    }

    #[tokio::test]
    async fn test_injection_text_is_only_a_parameter() {
        let store = seeded();
        let plan = builder()
            .build(
                EntityKind::Skill,
                &["x') OR 1=1; DROP TABLE job; --"],
                ResolvedWindow::all(),
                Granularity::Aggregate,
            )
            .unwrap();
        assert_eq!(store.count_matches(&plan).await.unwrap(), MatchRows::Aggregate(vec![]));
        assert_eq!(
            store.count_universe(EntityKind::JobRole, &ResolvedWindow::all()).await.unwrap(),
            4
        );
    }

    #[tokio::test]
    async fn test_daily_series_groups_by_day() {
        let store = seeded();
        let plan = QueryBuilder::new(TimeWindowResolver::frozen(day(6, 10)), 28)
            .build(EntityKind::JobRole, &["developer"], ResolvedWindow::all(), Granularity::DailySeries)
            .unwrap();
        let MatchRows::Daily(rows) = store.count_matches(&plan).await.unwrap() else {
            panic!("expected daily rows");
        };
        let days: Vec<_> = rows.iter().map(|r| r.day).collect();
        assert_eq!(days, vec![day(6, 1), day(6, 2)]);
        assert!(rows.iter().all(|r| r.name_index == 0 && r.frequency == 1));
    }

    #[tokio::test]
    async fn test_top_entities_with_min_frequency() {
        let store = seeded();
        let plan = RankingPlan {
            entity_kind: EntityKind::Skill,
            window: ResolvedWindow::all(),
            limit: 10,
            min_frequency: 1,
        };
        let rows = store.top_entities(&plan).await.unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.windows(2).all(|w| w[0].frequency >= w[1].frequency));
    }

    #[tokio::test]
    async fn test_recent_postings_carry_skills_in_insert_order() {
        let store = seeded();
        let recent = store.recent_postings(3).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|p| p.job_id).collect();
        assert_eq!(ids, vec![4, 2, 1]);
        assert!(recent[0].skills.is_empty());
        assert_eq!(recent[1].skills, vec!["React", "JavaScript"]);
        assert_eq!(recent[2].job_expertise.as_deref(), Some("Backend Developer"));
        assert_eq!(recent[2].posted_date, day(6, 1));
    }
}
