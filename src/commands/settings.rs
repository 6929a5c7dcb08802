//! 配置相关命令

use crate::config::{ConflictPolicy, MergeConfig};
use crate::logging::LogConfig;
use crate::AppState;

/// 获取日志配置
pub async fn get_log_config(state: &AppState) -> Result<LogConfig, String> {
    Ok(LogConfig::load(&state.config_dir))
}

/// 设置日志配置，下次启动生效
pub async fn set_log_config(
    state: &AppState,
    enabled: Option<bool>,
    level: Option<String>,
    keep_days: Option<u32>,
) -> Result<LogConfig, String> {
    let mut config = LogConfig::load(&state.config_dir);

    if let Some(e) = enabled {
        config.enabled = e;
    }
    if let Some(l) = level {
        // 验证日志级别
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if valid_levels.contains(&l.to_lowercase().as_str()) {
            config.level = l.to_lowercase();
        } else {
            return Err(format!("无效的日志级别: {}", l));
        }
    }
    if let Some(days) = keep_days {
        config.keep_days = days.min(365);
    }

    config.save(&state.config_dir).map_err(|e| e.to_string())?;

    Ok(config)
}

/// 获取合并配置
pub async fn get_merge_config(state: &AppState) -> Result<MergeConfig, String> {
    Ok(state.merge_config())
}

/// 设置合并配置，下一次开始或恢复时生效
pub async fn set_merge_config(
    state: &AppState,
    conflict_policy: Option<ConflictPolicy>,
    exclude_patterns: Option<Vec<String>>,
    default_extensions: Option<Vec<String>>,
) -> Result<MergeConfig, String> {
    let mut config = state.merge_config();

    if let Some(policy) = conflict_policy {
        config.conflict_policy = policy;
    }
    if let Some(patterns) = exclude_patterns {
        config.exclude_patterns = patterns
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }
    if let Some(exts) = default_extensions {
        config.default_extensions = exts;
    }

    config.save(&state.config_dir).map_err(|e| e.to_string())?;

    Ok(config)
}
