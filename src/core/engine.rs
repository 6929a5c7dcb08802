#![allow(non_snake_case)]

use crate::config::MergeConfig;
use crate::core::dest_index::DestinationIndex;
use crate::core::file_dedup::run_file_dedup;
use crate::core::folder_merge::run_folder_merge;
use crate::core::scanner::FileScanner;
use crate::core::state::{send_progress, ProgressTx, ReportEntry, RunPhase, RunState, RunStats};
use crate::error::Outcome;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 一次运行（或一段运行）结束时的汇总
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub runId: String,
    pub startTime: i64,
    pub endTime: i64,
    pub stats: RunStats,
    pub report: Vec<ReportEntry>,
    pub paused: bool,
    /// 被暂停时所处的阶段
    pub pausedIn: Option<RunPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 合并调度器：按阶段推进 RunState
pub struct MergeEngine {
    config: MergeConfig,
    cancel: CancellationToken,
}

impl MergeEngine {
    /// 每次开始或恢复都使用新的暂停令牌
    pub fn new(config: MergeConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// 请求暂停，在下一个检查点生效
    pub fn pause(&self) {
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 运行到完成、暂停或出错
    ///
    /// 对暂停过的 state 再次调用即为恢复：扫描未完成时重新扫描，之后重建目标索引、
    /// 重放目录合并，并从断点继续文件去重。
    pub async fn run(&self, state: &mut RunState, progress_tx: ProgressTx) -> RunSummary {
        let resuming = state.paused_in.take().is_some();
        info!(
            "{}合并任务: {} ({} 个源目录 -> {})",
            if resuming { "恢复" } else { "开始" },
            state.run_id,
            state.request.sources.len(),
            state.request.destination.display()
        );

        let filter = state.request.filter(&self.config.exclude_patterns);

        if !state.scan_complete {
            state.phase = RunPhase::ScanningSources;
            send_progress(&progress_tx, state.progress("正在扫描源目录...")).await;

            let scanner = FileScanner::new(filter.clone(), self.cancel.clone());
            let scan = scanner.scan_roots(&state.request.sources).await;
            if scan.incomplete {
                return self.paused_summary(state, RunPhase::ScanningSources);
            }
            state.load_scan(scan);
        }

        state.phase = RunPhase::IndexingDestination;
        send_progress(&progress_tx, state.progress("正在索引目标目录...")).await;
        let index = match DestinationIndex::build(
            &state.request.destination,
            &filter,
            &mut state.hash_cache,
            &self.cancel,
        )
        .await
        {
            Outcome::Done(index) => index,
            Outcome::Cancelled => return self.paused_summary(state, RunPhase::IndexingDestination),
            Outcome::Failed(e) => {
                error!("索引目标目录失败: {}", e);
                return self.failed_summary(state, e.to_string());
            }
        };

        state.phase = RunPhase::FolderMerge;
        send_progress(&progress_tx, state.progress("正在合并目录...")).await;
        match run_folder_merge(state, &index, &filter, &self.cancel, &progress_tx).await {
            Outcome::Done(()) => {}
            Outcome::Cancelled => return self.paused_summary(state, RunPhase::FolderMerge),
            Outcome::Failed(e) => return self.failed_summary(state, e.to_string()),
        }

        state.phase = RunPhase::FileDedup;
        send_progress(&progress_tx, state.progress("正在处理剩余文件...")).await;
        match run_file_dedup(
            state,
            &index,
            self.config.conflict_policy,
            &self.cancel,
            &progress_tx,
        )
        .await
        {
            Outcome::Done(()) => {}
            Outcome::Cancelled => return self.paused_summary(state, RunPhase::FileDedup),
            Outcome::Failed(e) => return self.failed_summary(state, e.to_string()),
        }

        state.phase = RunPhase::Complete;
        send_progress(&progress_tx, state.progress("完成")).await;

        let stats = state.stats();
        info!(
            "合并任务完成: {} - 扫描 {}, 复制 {}, 重复 {}, {} 字节",
            state.run_id, stats.scanned, stats.copied, stats.duplicates, stats.size_copied_bytes
        );
        self.summary(state, None)
    }

    fn summary(&self, state: &RunState, error: Option<String>) -> RunSummary {
        RunSummary {
            runId: state.run_id.clone(),
            startTime: state.started_at,
            endTime: chrono::Utc::now().timestamp(),
            stats: state.stats(),
            report: state.report.clone(),
            paused: state.is_paused(),
            pausedIn: state.paused_in,
            error,
        }
    }

    /// 创建暂停汇总，记住被打断的阶段
    fn paused_summary(&self, state: &mut RunState, phase: RunPhase) -> RunSummary {
        info!("合并任务已暂停: {} (阶段 {})", state.run_id, phase);
        state.paused_in = Some(phase);
        state.phase = RunPhase::Paused;
        self.summary(state, None)
    }

    /// 创建失败汇总，保留已有计数
    fn failed_summary(&self, state: &mut RunState, message: String) -> RunSummary {
        warn!("合并任务失败: {} - {}", state.run_id, message);
        state.phase = RunPhase::Idle;
        self.summary(state, Some(message))
    }
}
