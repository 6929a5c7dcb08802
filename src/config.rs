//! 应用配置模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// 文件名冲突时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// 改名为 `name_N.ext` 后复制
    #[default]
    Rename,
    /// 不复制，计为重复
    Skip,
}

/// 合并配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConfig {
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// 按文件名排除（支持 `*` 和 `?`）
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    /// 未指定扩展名时使用，空表示全部文件
    #[serde(default)]
    pub default_extensions: Vec<String>,
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        ".DS_Store".to_string(),
        "Thumbs.db".to_string(),
        "desktop.ini".to_string(),
    ]
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            exclude_patterns: default_exclude_patterns(),
            default_extensions: Vec::new(),
        }
    }
}

impl MergeConfig {
    /// 从配置文件加载合并配置
    pub fn load(config_dir: &Path) -> Self {
        read_section(config_dir, "merge").unwrap_or_default()
    }

    /// 保存合并配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        write_section(config_dir, "merge", self)
    }
}

/// 读取 config.json 中的某个键，文件缺失或格式错误时返回 None
pub(crate) fn read_section<T: serde::de::DeserializeOwned>(config_dir: &Path, key: &str) -> Option<T> {
    let content = fs::read_to_string(config_dir.join("config.json")).ok()?;
    let config = serde_json::from_str::<serde_json::Value>(&content).ok()?;
    serde_json::from_value(config.get(key)?.clone()).ok()
}

/// 只改写 config.json 中的某个键，其余内容保持不变
pub(crate) fn write_section<T: Serialize>(config_dir: &Path, key: &str, value: &T) -> io::Result<()> {
    let config_file = config_dir.join("config.json");

    // 读取现有配置
    let mut config: serde_json::Value = if config_file.exists() {
        let content = fs::read_to_string(&config_file)?;
        serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        serde_json::json!({})
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[key] = serde_json::to_value(value).map_err(io::Error::other)?;

    let content = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
    fs::write(&config_file, content)
}
