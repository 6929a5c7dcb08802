//! 运行状态：一次合并运行期间的全部可变数据

use crate::core::filter::FileFilter;
use crate::core::hasher::{ContentKey, HashCache};
use crate::core::scanner::{FileRecord, FolderRecord, ScanResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// 运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunPhase {
    Idle,
    ScanningSources,
    IndexingDestination,
    FolderMerge,
    FileDedup,
    Complete,
    Paused,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::ScanningSources => write!(f, "scanning_sources"),
            RunPhase::IndexingDestination => write!(f, "indexing_destination"),
            RunPhase::FolderMerge => write!(f, "folder_merge"),
            RunPhase::FileDedup => write!(f, "file_dedup"),
            RunPhase::Complete => write!(f, "complete"),
            RunPhase::Paused => write!(f, "paused"),
        }
    }
}

/// 计数器
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub scanned: u64,
    pub copied: u64,
    pub duplicates: u64,
    pub size_copied_bytes: u64,
}

impl std::ops::Add for RunStats {
    type Output = RunStats;

    fn add(self, rhs: RunStats) -> RunStats {
        RunStats {
            scanned: self.scanned + rhs.scanned,
            copied: self.copied + rhs.copied,
            duplicates: self.duplicates + rhs.duplicates,
            size_copied_bytes: self.size_copied_bytes + rhs.size_copied_bytes,
        }
    }
}

/// 目录级处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderStatus {
    Copied,
    Duplicate,
    Failed(String),
}

impl std::fmt::Display for FolderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FolderStatus::Copied => write!(f, "Copied"),
            FolderStatus::Duplicate => write!(f, "Duplicate (Exists in Destination)"),
            FolderStatus::Failed(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl Serialize for FolderStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 报告条目
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub status: FolderStatus,
}

/// 运行请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub sources: Vec<PathBuf>,
    pub destination: PathBuf,
    /// 小写扩展名，空表示全部
    pub extensions: Vec<String>,
}

impl RunRequest {
    pub fn new(sources: Vec<PathBuf>, destination: PathBuf, extensions: &[String]) -> Self {
        let mut extensions: Vec<String> = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        extensions.sort();
        extensions.dedup();
        Self {
            sources,
            destination,
            extensions,
        }
    }

    pub fn filter(&self, exclude_patterns: &[String]) -> FileFilter {
        FileFilter::new(&self.extensions, exclude_patterns)
    }
}

/// 一次运行的全部状态，只由调度器持有
#[derive(Debug)]
pub struct RunState {
    pub run_id: String,
    pub request: RunRequest,
    pub started_at: i64,
    pub phase: RunPhase,
    /// 暂停时被打断的阶段
    pub paused_in: Option<RunPhase>,
    pub scan_complete: bool,
    /// 文件去重阶段的断点（扁平文件列表下标）
    pub cursor: usize,
    /// 本次运行已见过的内容
    pub seen: HashSet<ContentKey>,
    pub files: Vec<FileRecord>,
    pub folders: BTreeMap<PathBuf, FolderRecord>,
    /// 已被目录合并整体处理的源目录
    pub absorbed: HashSet<PathBuf>,
    /// 目录合并阶段的报告与计数，只追加，恢复时保留
    pub report: Vec<ReportEntry>,
    pub merge_stats: RunStats,
    pub file_stats: RunStats,
    pub hash_cache: HashCache,
}

impl RunState {
    pub fn new(request: RunRequest) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            request,
            started_at: chrono::Utc::now().timestamp(),
            phase: RunPhase::Idle,
            paused_in: None,
            scan_complete: false,
            cursor: 0,
            seen: HashSet::new(),
            files: Vec::new(),
            folders: BTreeMap::new(),
            absorbed: HashSet::new(),
            report: Vec::new(),
            merge_stats: RunStats::default(),
            file_stats: RunStats::default(),
            hash_cache: HashCache::new(),
        }
    }

    /// 载入扫描结果
    pub fn load_scan(&mut self, scan: ScanResult) {
        self.scan_complete = !scan.incomplete;
        self.files = scan.files;
        self.folders = scan.folders;
        self.cursor = 0;
    }

    /// 当前累计计数
    pub fn stats(&self) -> RunStats {
        self.merge_stats + self.file_stats
    }

    /// 该源目录在本次运行中是否已经有了报告条目
    pub fn folder_processed(&self, folder: &Path) -> bool {
        self.report.iter().any(|r| r.source_path == folder)
    }

    /// 文件所在目录（或其祖先）是否已被整体处理
    pub fn is_absorbed(&self, folder: &Path) -> bool {
        folder.ancestors().any(|a| self.absorbed.contains(a))
    }

    pub fn is_paused(&self) -> bool {
        self.phase == RunPhase::Paused
    }

    /// 生成当前进度
    pub fn progress(&self, label: impl Into<String>) -> ProgressUpdate {
        ProgressUpdate {
            run_id: self.run_id.clone(),
            phase: self.phase,
            current_item_label: label.into(),
            stats: self.stats(),
        }
    }
}

/// 进度更新
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub run_id: String,
    pub phase: RunPhase,
    pub current_item_label: String,
    pub stats: RunStats,
}

/// 进度通道，可为空
pub type ProgressTx = Option<mpsc::Sender<ProgressUpdate>>;

/// 发送进度更新，接收端关闭时忽略
pub async fn send_progress(tx: &ProgressTx, progress: ProgressUpdate) {
    if let Some(tx) = tx {
        let _ = tx.send(progress).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_normalizes_extensions() {
        let req = RunRequest::new(
            vec![PathBuf::from("/s")],
            PathBuf::from("/d"),
            &[".JPG".to_string(), "jpg".to_string(), " png ".to_string(), "".to_string()],
        );
        assert_eq!(req.extensions, vec!["jpg".to_string(), "png".to_string()]);
    }

    #[test]
    fn test_absorbed_prefix_match() {
        let mut state = RunState::new(RunRequest::new(vec![], PathBuf::from("/d"), &[]));
        state.absorbed.insert(PathBuf::from("/s/pics"));
        assert!(state.is_absorbed(Path::new("/s/pics")));
        assert!(state.is_absorbed(Path::new("/s/pics/p1")));
        assert!(!state.is_absorbed(Path::new("/s/pics2")));
        assert!(!state.is_absorbed(Path::new("/s")));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(FolderStatus::Copied.to_string(), "Copied");
        assert_eq!(
            FolderStatus::Duplicate.to_string(),
            "Duplicate (Exists in Destination)"
        );
        let json = serde_json::to_string(&FolderStatus::Failed("disk full".into())).unwrap();
        assert_eq!(json, "\"Error: disk full\"");
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let stats = RunStats {
            scanned: 3,
            copied: 1,
            duplicates: 2,
            size_copied_bytes: 10,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["sizeCopiedBytes"], 10);
        assert_eq!(json["duplicates"], 2);
    }
}
