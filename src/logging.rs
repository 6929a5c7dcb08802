//! 日志模块 - 文件日志（按天滚动）与控制台输出

use crate::config::{read_section, write_section};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

/// 日志文件名前缀，实际文件为 `foldermerge.log.YYYY-MM-DD`
const LOG_FILE_PREFIX: &str = "foldermerge.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 保留最近几天的日志文件，0 表示不清理
    #[serde(default = "default_keep_days")]
    pub keep_days: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_keep_days() -> u32 {
    7
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            level: default_level(),
            keep_days: default_keep_days(),
        }
    }
}

impl LogConfig {
    /// 从配置文件加载日志配置
    pub fn load(config_dir: &Path) -> Self {
        read_section(config_dir, "log").unwrap_or_default()
    }

    /// 保存日志配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        write_section(config_dir, "log", self)
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 日志目录
pub fn log_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("logs")
}

/// 初始化日志系统
///
/// 返回的 guard 必须在程序退出前一直持有，否则缓冲中的日志会丢失。
pub fn init_logging(config_dir: &Path) -> Option<WorkerGuard> {
    let config = LogConfig::load(config_dir);

    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return None;
    }

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(config.tracing_level().into());

    let dir = log_dir(config_dir);
    if let Err(e) = fs::create_dir_all(&dir) {
        // 无法写文件时退回控制台
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
        tracing::warn!("无法创建日志目录 {}: {}", dir.display(), e);
        return None;
    }
    prune_old_logs(&dir, config.keep_days);

    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    // 文件日志层 - 始终输出到文件
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    // 在 debug 模式下也输出到控制台
    #[cfg(debug_assertions)]
    {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    #[cfg(not(debug_assertions))]
    {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    Some(guard)
}

/// 删除超过保留天数的日志文件
fn prune_old_logs(dir: &Path, keep_days: u32) {
    if keep_days == 0 {
        return;
    }
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(keep_days as i64);

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(date) = log_file_date(&name) else {
            continue;
        };
        if date < cutoff {
            let _ = fs::remove_file(entry.path());
        }
    }
}

/// 从 `foldermerge.log.2024-01-31` 中取出日期
fn log_file_date(file_name: &str) -> Option<chrono::NaiveDate> {
    let suffix = file_name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    chrono::NaiveDate::parse_from_str(suffix, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        let mut config = LogConfig::default();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
        config.level = "DEBUG".into();
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
        config.level = "nonsense".into();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_log_file_date() {
        assert_eq!(
            log_file_date("foldermerge.log.2024-01-31"),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 31)
        );
        assert_eq!(log_file_date("foldermerge.log"), None);
        assert_eq!(log_file_date("other.log.2024-01-31"), None);
    }

    #[test]
    fn test_prune_keeps_recent_logs() {
        let dir = tempfile::tempdir().unwrap();
        let today = chrono::Local::now().date_naive();
        let old = today - chrono::Duration::days(30);
        let recent = format!("{}.{}", LOG_FILE_PREFIX, today.format("%Y-%m-%d"));
        let stale = format!("{}.{}", LOG_FILE_PREFIX, old.format("%Y-%m-%d"));
        fs::write(dir.path().join(&recent), b"").unwrap();
        fs::write(dir.path().join(&stale), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        prune_old_logs(dir.path(), 7);

        assert!(dir.path().join(&recent).exists());
        assert!(!dir.path().join(&stale).exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_log_config_roundtrip_through_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            enabled: false,
            level: "warn".into(),
            keep_days: 3,
        };
        config.save(dir.path()).unwrap();
        let loaded = LogConfig::load(dir.path());
        assert!(!loaded.enabled);
        assert_eq!(loaded.keep_days, 3);
    }
}
