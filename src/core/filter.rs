//! 文件过滤：扩展名白名单 + 排除规则

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

/// 文件过滤器
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// 允许的扩展名（小写、不带点），空表示不限制
    extensions: HashSet<String>,
    /// 排除规则，按文件名匹配
    exclude: Vec<Regex>,
}

impl FileFilter {
    /// 不做任何过滤
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// 根据扩展名列表和排除规则创建过滤器
    ///
    /// 扩展名可以带或不带前导点，大小写不敏感。
    pub fn new<S: AsRef<str>>(extensions: &[S], exclude_patterns: &[String]) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let exclude = exclude_patterns
            .iter()
            .filter_map(|p| match glob_to_regex(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("忽略无效的排除规则 {}: {}", p, e);
                    None
                }
            })
            .collect();

        Self {
            extensions,
            exclude,
        }
    }

    /// 检查文件是否应该被处理
    pub fn allows(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };

        if self.exclude.iter().any(|re| re.is_match(name)) {
            return false;
        }

        if self.extensions.is_empty() {
            return true;
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        self.extensions.contains(&ext)
    }
}

/// 简单的 glob 转正则：`*` 匹配任意字符，`?` 匹配单个字符
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}
