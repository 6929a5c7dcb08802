//! 目标目录同名目录整理命令

use crate::commands::events::AppEvent;
use crate::core::consolidate::{consolidate, discover_groups, validate_groups};
use crate::core::{MergeGroup, RunStats};
use crate::error::Outcome;
use crate::AppState;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

const PAUSED_MESSAGE: &str = "操作已暂停";

fn destination_path(destination: &str) -> Result<PathBuf, String> {
    let destination = destination.trim();
    if destination.is_empty() {
        return Err("请选择目标目录".to_string());
    }
    let path = PathBuf::from(destination);
    if !path.is_dir() {
        return Err(format!("目标目录不存在: {}", path.display()));
    }
    Ok(path)
}

/// 查找同名目录：有可合并的组时发送 merge-confirmation，否则直接发送 merge-complete
pub async fn merge_folders(state: &AppState, destination: String) -> Result<(), String> {
    let destination = destination_path(&destination)?;
    if state.running.load(Ordering::SeqCst) {
        return Err("已有任务正在运行".to_string());
    }

    let event = match discover_groups(&destination, &CancellationToken::new()).await {
        Outcome::Done(groups) if groups.is_empty() => AppEvent::MergeComplete {
            stats: RunStats::default(),
            error: None,
        },
        Outcome::Done(groups) => AppEvent::MergeConfirmation { groups },
        Outcome::Cancelled => AppEvent::MergeComplete {
            stats: RunStats::default(),
            error: Some(PAUSED_MESSAGE.to_string()),
        },
        Outcome::Failed(e) => return Err(e.to_string()),
    };
    let _ = state.events.send(event).await;
    Ok(())
}

/// 执行确认后的合并，结束时发送 merge-complete
pub async fn confirm_merge(
    state: &AppState,
    destination: String,
    groups: Vec<MergeGroup>,
) -> Result<(), String> {
    let destination = destination_path(&destination)?;
    validate_groups(&destination, &groups).map_err(|e| e.to_string())?;

    if state.running.swap(true, Ordering::SeqCst) {
        return Err("已有任务正在运行".to_string());
    }
    let running = scopeguard::guard(state.running.clone(), |flag| {
        flag.store(false, Ordering::SeqCst)
    });

    let token = CancellationToken::new();
    *state.pause_token.lock().await = Some(token.clone());

    let app = state.clone();
    tokio::spawn(async move {
        let mut stats = RunStats::default();
        let error = match consolidate(&destination, &groups, &token, &mut stats).await {
            Outcome::Done(()) => None,
            Outcome::Cancelled => Some(PAUSED_MESSAGE.to_string()),
            Outcome::Failed(e) => Some(e.to_string()),
        };
        tracing::info!(
            "目录整理结束: 复制 {}, 重复 {}{}",
            stats.copied,
            stats.duplicates,
            error.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default()
        );

        *app.pause_token.lock().await = None;
        drop(running);
        let _ = app.events.send(AppEvent::MergeComplete { stats, error }).await;
    });

    Ok(())
}
