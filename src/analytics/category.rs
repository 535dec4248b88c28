//! 技能分类
//!
//! 按固定顺序逐类匹配关键字，首个命中的类别胜出；都不命中归入 Other。
//! 长度不超过 3 的关键字（r、go、ai、sql 等）只做整词匹配，其余关键字做子串匹配。

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Programming,
    AiMl,
    Data,
    Cloud,
    Web,
    Database,
    SoftSkills,
    Tools,
    Other,
}

impl SkillCategory {
    /// 匹配顺序（Other 不参与匹配）
    pub const ORDERED: [SkillCategory; 8] = [
        SkillCategory::Programming,
        SkillCategory::AiMl,
        SkillCategory::Data,
        SkillCategory::Cloud,
        SkillCategory::Web,
        SkillCategory::Database,
        SkillCategory::SoftSkills,
        SkillCategory::Tools,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SkillCategory::Programming => "Programming Languages",
            SkillCategory::AiMl => "AI/ML Technologies",
            SkillCategory::Data => "Data Technologies",
            SkillCategory::Cloud => "Cloud & DevOps",
            SkillCategory::Web => "Web Technologies",
            SkillCategory::Database => "Database Technologies",
            SkillCategory::SoftSkills => "Soft Skills",
            SkillCategory::Tools => "Development Tools",
            SkillCategory::Other => "Other Technical",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            SkillCategory::Programming => &[
                "python", "javascript", "java", "c++", "c#", "r", "scala", "go", "rust",
                "typescript", "node.js", "php", "kotlin", "swift", "dart",
            ],
            SkillCategory::AiMl => &[
                "ai", "machine learning", "deep learning", "nlp", "computer vision", "tensorflow",
                "pytorch", "keras", "generative ai", "llm", "neural networks",
                "reinforcement learning", "mlops", "opencv", "scikit-learn",
            ],
            SkillCategory::Data => &[
                "data analysis", "data science", "big data", "data mining", "data visualization",
                "analytics", "statistics", "pandas", "numpy", "matplotlib", "seaborn", "power bi",
                "tableau", "looker", "sql", "excel",
            ],
            SkillCategory::Cloud => &[
                "aws", "azure", "gcp", "google cloud", "cloud computing", "kubernetes", "docker",
                "terraform", "ansible", "jenkins", "ci/cd", "devops",
            ],
            SkillCategory::Web => &[
                "react", "angular", "vue", "html", "css", "express", "django", "flask", "spring",
                "asp.net", "laravel",
            ],
            SkillCategory::Database => &[
                "mysql", "postgresql", "mongodb", "redis", "elasticsearch", "bigquery", "oracle",
                "sqlite", "cassandra", "dynamodb",
            ],
            SkillCategory::SoftSkills => &[
                "communication", "teamwork", "leadership", "problem solving",
                "analytical thinking", "project management", "agile", "scrum", "english",
                "business analysis", "creativity",
            ],
            SkillCategory::Tools => &[
                "git", "github", "gitlab", "jira", "confluence", "visual studio", "intellij",
                "linux", "unix", "bash", "powershell", "vim",
            ],
            SkillCategory::Other => &[],
        }
    }
}

/// 一个类别及其下的技能（保持输入顺序）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub category: SkillCategory,
    pub label: &'static str,
    pub skills: Vec<String>,
}

fn tokens(lower: &str) -> impl Iterator<Item = &str> {
    lower
        .split(|c: char| c.is_whitespace() || "/,()-_".contains(c))
        .filter(|t| !t.is_empty())
}

fn keyword_matches(lower: &str, keyword: &str) -> bool {
    if keyword.chars().count() <= 3 {
        tokens(lower).any(|t| t == keyword)
    } else {
        lower.contains(keyword)
    }
}

pub fn categorize_skill(skill: &str) -> SkillCategory {
    let lower = skill.trim().to_lowercase();
    SkillCategory::ORDERED
        .into_iter()
        .find(|category| {
            category
                .keywords()
                .iter()
                .any(|kw| keyword_matches(&lower, kw))
        })
        .unwrap_or(SkillCategory::Other)
}

/// 分组；只返回非空类别，顺序与匹配顺序一致，Other 在最后
pub fn categorize<S: AsRef<str>>(skills: &[S]) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = SkillCategory::ORDERED
        .into_iter()
        .chain(std::iter::once(SkillCategory::Other))
        .map(|category| CategoryGroup {
            category,
            label: category.label(),
            skills: Vec::new(),
        })
        .collect();

    for skill in skills {
        let skill = skill.as_ref().trim();
        if skill.is_empty() {
            continue;
        }
        let category = categorize_skill(skill);
        if let Some(group) = groups.iter_mut().find(|g| g.category == category) {
            group.skills.push(skill.to_string());
        }
    }

    groups.retain(|g| !g.skills.is_empty());
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_keywords_need_whole_tokens() {
        assert_eq!(categorize_skill("R"), SkillCategory::Programming);
        assert_eq!(categorize_skill("Go"), SkillCategory::Programming);
        // "go" 不应命中 Google、"ai" 不应命中 Email
        assert_eq!(categorize_skill("Google Cloud"), SkillCategory::Cloud);
        assert_eq!(categorize_skill("Email Marketing"), SkillCategory::Other);
        assert_eq!(categorize_skill("Generative AI"), SkillCategory::AiMl);
    }

    #[test]
    fn test_first_matching_category_wins() {
        assert_eq!(categorize_skill("JavaScript"), SkillCategory::Programming);
        assert_eq!(categorize_skill("React"), SkillCategory::Web);
        assert_eq!(categorize_skill("SQL"), SkillCategory::Data);
        assert_eq!(categorize_skill("MySQL"), SkillCategory::Database);
        assert_eq!(categorize_skill("CI/CD"), SkillCategory::Cloud);
        assert_eq!(categorize_skill("GitHub"), SkillCategory::Tools);
    }

    #[test]
    fn test_categorize_groups_in_fixed_order() {
        let groups = categorize(&["Teamwork", "Python", "Underwater Basket Weaving", "Docker", ""]);
        let labels: Vec<_> = groups.iter().map(|g| g.label).collect();
        assert_eq!(
            labels,
            vec!["Programming Languages", "Cloud & DevOps", "Soft Skills", "Other Technical"]
        );
        assert_eq!(groups[3].skills, vec!["Underwater Basket Weaving"]);
    }
}
