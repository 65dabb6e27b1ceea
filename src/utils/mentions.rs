use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// 从正文中提取 @提及 的用户名
///
/// 匹配 "@" 后跟单词字符、点或连字符的片段，返回去重后的用户名集合
/// （不含 "@" 前缀）。这里不校验用户名是否存在，未知用户名由调用方
/// 在解析为真实用户时静默丢弃。纯函数，无副作用。
pub fn extract_mentions(text: &str) -> HashSet<String> {
    static MENTION_PATTERN: OnceLock<Regex> = OnceLock::new();

    if text.is_empty() {
        return HashSet::new();
    }

    let pattern = MENTION_PATTERN.get_or_init(|| {
        Regex::new(r"@([\w.-]+)").expect("mention pattern is valid")
    });

    pattern
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}
