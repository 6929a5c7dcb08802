//! 合并任务命令：开始、暂停、恢复

use crate::commands::events::AppEvent;
use crate::core::{MergeEngine, ProgressUpdate, RunRequest, RunState};
use crate::AppState;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

/// 校验参数并构造运行请求，未指定扩展名时使用配置中的默认值
pub(crate) fn build_request(
    state: &AppState,
    sources: Vec<String>,
    destination: String,
    extensions: Vec<String>,
) -> Result<RunRequest, String> {
    let sources: Vec<PathBuf> = sources
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    if sources.is_empty() {
        return Err("请至少选择一个源目录".to_string());
    }
    if destination.trim().is_empty() {
        return Err("请选择目标目录".to_string());
    }
    let destination = PathBuf::from(destination.trim());
    let dest_real = comparable_path(&destination);
    if let Some(src) = sources
        .iter()
        .find(|s| dest_real.starts_with(comparable_path(s)))
    {
        return Err(format!("目标目录不能位于源目录内: {}", src.display()));
    }

    let extensions = if extensions.is_empty() {
        state.merge_config().default_extensions
    } else {
        extensions
    };
    Ok(RunRequest::new(sources, destination, &extensions))
}

/// 用于比较的路径：绝对化、消去 `.` 和 `..`，已存在的部分解析符号链接
fn comparable_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    // 目标目录可能还不存在，只规范化最长的已存在前缀
    let mut existing = normalized.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(real) = std::fs::canonicalize(existing) {
            return missing.iter().rev().fold(real, |acc, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

/// 开始新的合并任务，返回任务 ID
pub async fn start_process(
    state: &AppState,
    sources: Vec<String>,
    destination: String,
    extensions: Vec<String>,
) -> Result<String, String> {
    let request = build_request(state, sources, destination, extensions)?;
    launch(state, RunState::new(request)).await
}

/// 暂停当前任务
pub async fn pause_process(state: &AppState) -> Result<(), String> {
    match state.pause_token.lock().await.as_ref() {
        Some(token) => {
            tracing::info!("请求暂停");
            token.cancel();
            Ok(())
        }
        None => Err("没有正在运行的任务".to_string()),
    }
}

/// 恢复暂停的任务；没有可恢复的状态或参数不一致时重新开始
pub async fn resume_process(
    state: &AppState,
    sources: Vec<String>,
    destination: String,
    extensions: Vec<String>,
) -> Result<String, String> {
    let request = build_request(state, sources, destination, extensions)?;
    if state.running.load(Ordering::SeqCst) {
        return Err("已有任务正在运行".to_string());
    }

    let saved = state.run_state.lock().await.take();
    match saved {
        Some(run) if run.is_paused() && run.request == request => {
            tracing::debug!("恢复任务: {}, 断点 {}", run.run_id, run.cursor);
            launch(state, run).await
        }
        _ => {
            tracing::debug!("没有可恢复的任务，重新开始");
            launch(state, RunState::new(request)).await
        }
    }
}

/// 在后台运行，结束时保存状态并发送 process-complete
async fn launch(state: &AppState, mut run: RunState) -> Result<String, String> {
    if state.running.swap(true, Ordering::SeqCst) {
        // 没能启动，状态放回去
        let mut slot = state.run_state.lock().await;
        if slot.is_none() {
            *slot = Some(run);
        }
        return Err("已有任务正在运行".to_string());
    }
    let running = scopeguard::guard(state.running.clone(), |flag| {
        flag.store(false, Ordering::SeqCst)
    });

    let run_id = run.run_id.clone();
    let token = CancellationToken::new();
    *state.pause_token.lock().await = Some(token.clone());

    // 创建进度通道
    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ProgressUpdate>(100);

    // 启动进度转发任务
    let events = state.events.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            let _ = events.send(AppEvent::ProgressUpdate(progress)).await;
        }
    });

    let config = state.merge_config();
    let app = state.clone();
    tokio::spawn(async move {
        let engine = MergeEngine::new(config, token);
        let summary = engine.run(&mut run, Some(progress_tx)).await;

        // 发送端已随 run 结束释放，等待剩余进度转发完毕
        let _ = forwarder.await;

        *app.run_state.lock().await = Some(run);
        *app.pause_token.lock().await = None;
        drop(running);

        let _ = app.events.send(AppEvent::ProcessComplete(summary)).await;
    });

    Ok(run_id)
}
