//! 发往调用方的事件

use crate::core::{MergeGroup, ProgressUpdate, RunStats, RunSummary};
use serde::Serialize;

/// 序列化为 `{"event": "...", "payload": {...}}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum AppEvent {
    ProgressUpdate(ProgressUpdate),
    ProcessComplete(RunSummary),
    MergeConfirmation {
        groups: Vec<MergeGroup>,
    },
    MergeComplete {
        stats: RunStats,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AppEvent {
    /// 事件名
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::ProgressUpdate(_) => "progress-update",
            AppEvent::ProcessComplete(_) => "process-complete",
            AppEvent::MergeConfirmation { .. } => "merge-confirmation",
            AppEvent::MergeComplete { .. } => "merge-complete",
        }
    }
}
