//! 目标目录内同名目录整理：`Photos`、`Photos_bak` 合并为 `Photos`

use crate::core::copy::{exists, merge_tree};
use crate::core::dest_index::collect_keys;
use crate::core::filter::FileFilter;
use crate::core::hasher::HashCache;
use crate::core::scanner::FileScanner;
use crate::core::signature::normalized_name;
use crate::core::state::RunStats;
use crate::error::{MergeError, Outcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 一组规范化名字相同的目录，第一个为合并目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeGroup {
    pub name: String,
    pub folders: Vec<PathBuf>,
}

impl MergeGroup {
    pub fn primary(&self) -> Option<&Path> {
        self.folders.first().map(|p| p.as_path())
    }
}

/// 找出目标目录中规范化名字相同的叶子目录
pub async fn discover_groups(
    destination: &Path,
    cancel: &CancellationToken,
) -> Outcome<Vec<MergeGroup>> {
    let scan = FileScanner::new(FileFilter::allow_all(), cancel.clone())
        .scan(destination)
        .await;
    if scan.incomplete {
        return Outcome::Cancelled;
    }

    let mut by_name: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for folder in scan.leaf_folders().filter(|f| f.path.as_path() != destination) {
        let name = folder.name();
        by_name
            .entry(normalized_name(&name).to_string())
            .or_default()
            .push(folder.path.clone());
    }

    let groups: Vec<MergeGroup> = by_name
        .into_iter()
        .filter(|(_, folders)| folders.len() > 1)
        .map(|(name, mut folders)| {
            // 名字恰好等于规范化名字的目录排在最前，其余保持路径顺序
            folders.sort_by_key(|p| p.file_name().map(|n| n != name.as_str()).unwrap_or(true));
            MergeGroup { name, folders }
        })
        .collect();

    info!("发现 {} 组同名目录: {}", groups.len(), destination.display());
    Outcome::Done(groups)
}

/// 检查所有路径都在目标目录之内
pub fn validate_groups(destination: &Path, groups: &[MergeGroup]) -> Result<(), MergeError> {
    for group in groups {
        for folder in &group.folders {
            let escapes = folder.components().any(|c| c == Component::ParentDir);
            if escapes || !folder.starts_with(destination) || folder.as_path() == destination {
                return Err(MergeError::Structural(format!(
                    "路径不在目标目录内: {}",
                    folder.display()
                )));
            }
        }
    }
    Ok(())
}

/// 把每组的其余目录合并进第一个目录，合并无错误的目录随后删除
///
/// 计数写入 `stats`，暂停时已完成的部分仍然保留在其中。
pub async fn consolidate(
    destination: &Path,
    groups: &[MergeGroup],
    cancel: &CancellationToken,
    stats: &mut RunStats,
) -> Outcome<()> {
    if let Err(e) = validate_groups(destination, groups) {
        return Outcome::Failed(e);
    }

    let filter = FileFilter::allow_all();
    let mut cache = HashCache::new();

    for group in groups {
        let Some((primary, members)) = group.folders.split_first() else {
            continue;
        };
        if members.is_empty() {
            continue;
        }
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        info!("整理目录组 {} -> {}", group.name, primary.display());
        let mut known = crate::try_outcome!(collect_keys(primary, &mut cache, cancel).await);

        for member in members {
            if !exists(member).await {
                warn!("目录不存在，跳过: {}", member.display());
                continue;
            }
            let tally = crate::try_outcome!(
                merge_tree(member, primary, &filter, &mut known, &mut cache, cancel).await
            );

            stats.scanned += tally.copied + tally.duplicates;
            stats.copied += tally.copied;
            stats.duplicates += tally.duplicates;
            stats.size_copied_bytes += tally.bytes;

            if !tally.errors.is_empty() {
                warn!(
                    "{} 合并时有 {} 个错误，保留该目录",
                    member.display(),
                    tally.errors.len()
                );
                continue;
            }
            match tokio::fs::remove_dir_all(member).await {
                Ok(()) => debug!("已删除: {}", member.display()),
                Err(e) => warn!("删除目录失败 {}: {}", member.display(), e),
            }
        }
    }

    Outcome::Done(())
}
