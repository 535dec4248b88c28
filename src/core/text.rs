//! 日志与 transcript 用的文本截断

/// 按字符截断，超出 max 时追加 `...`
pub fn preview(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}
