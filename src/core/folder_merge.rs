//! 目录级合并：按规范化名字分组，整目录判重或合并到目标

use crate::core::copy::{copy_tree, exists, merge_tree, CopyTally};
use crate::core::dest_index::{collect_keys, DestinationIndex};
use crate::core::filter::FileFilter;
use crate::core::scanner::FolderRecord;
use crate::core::signature::{build_signature, normalized_name};
use crate::core::state::{send_progress, FolderStatus, ProgressTx, ReportEntry, RunState};
use crate::error::Outcome;
use std::collections::{BTreeMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 将叶子目录按规范化名字分组，组内保持扫描顺序
pub fn group_leaf_folders<'a>(
    folders: impl Iterator<Item = &'a FolderRecord>,
) -> BTreeMap<String, Vec<FolderRecord>> {
    let mut groups: BTreeMap<String, Vec<FolderRecord>> = BTreeMap::new();
    for folder in folders.filter(|f| f.is_leaf) {
        let name = folder.name();
        groups
            .entry(normalized_name(&name).to_string())
            .or_default()
            .push(folder.clone());
    }
    groups
}

/// 执行目录合并阶段
///
/// 恢复时再次调用：已有报告条目的目录直接跳过，报告和计数只追加。
pub async fn run_folder_merge(
    state: &mut RunState,
    index: &DestinationIndex,
    filter: &FileFilter,
    cancel: &CancellationToken,
    progress: &ProgressTx,
) -> Outcome<()> {
    let groups = group_leaf_folders(state.folders.values());
    info!("目录合并: {} 个分组", groups.len());

    for (name, members) in groups {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let group_size = members.len();
        let pending: Vec<FolderRecord> = members
            .into_iter()
            .filter(|m| !state.folder_processed(&m.path))
            .collect();
        if pending.is_empty() {
            continue;
        }

        let dest_folder = state.request.destination.join(&name);
        let existed = exists(&dest_folder).await;
        let mut known = if existed {
            crate::try_outcome!(collect_keys(&dest_folder, &mut state.hash_cache, cancel).await)
        } else {
            HashSet::new()
        };
        let plain_copy = !existed && group_size == 1;

        for member in pending {
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }

            let signature =
                crate::try_outcome!(build_signature(&member, &mut state.hash_cache, cancel).await);
            let file_count = member.files.len() as u64;

            if let Some(existing) = index.matching_folder(&signature) {
                info!(
                    "目录已存在于目标中: {} == {}",
                    member.path.display(),
                    existing.display()
                );
                state.merge_stats.scanned += file_count;
                state.merge_stats.duplicates += file_count;
                state.absorbed.insert(member.path.clone());
                state.report.push(ReportEntry {
                    source_path: member.path.clone(),
                    destination_path: existing.to_path_buf(),
                    status: FolderStatus::Duplicate,
                });
            } else {
                debug!("合并目录: {} -> {}", member.path.display(), dest_folder.display());
                let result = if plain_copy {
                    copy_tree(&member.path, &dest_folder, filter, cancel).await
                } else {
                    merge_tree(
                        &member.path,
                        &dest_folder,
                        filter,
                        &mut known,
                        &mut state.hash_cache,
                        cancel,
                    )
                    .await
                };

                let status = match result {
                    Outcome::Done(tally) => apply_tally(state, &member, tally, cancel).await,
                    Outcome::Cancelled => return Outcome::Cancelled,
                    Outcome::Failed(e) => {
                        warn!("合并目录失败 {}: {}", member.path.display(), e);
                        FolderStatus::Failed(e.to_string())
                    }
                };
                state.report.push(ReportEntry {
                    source_path: member.path.clone(),
                    destination_path: dest_folder.clone(),
                    status,
                });
            }

            send_progress(
                progress,
                state.progress(format!("{} -> {}", member.path.display(), name)),
            )
            .await;
        }
    }

    info!(
        "目录合并完成: 吸收 {} 个目录, 复制 {} 个文件, 重复 {} 个",
        state.absorbed.len(),
        state.merge_stats.copied,
        state.merge_stats.duplicates
    );
    Outcome::Done(())
}

/// 记录一次目录复制的结果，返回报告状态
async fn apply_tally(
    state: &mut RunState,
    member: &FolderRecord,
    tally: CopyTally,
    cancel: &CancellationToken,
) -> FolderStatus {
    state.merge_stats.scanned += tally.copied + tally.duplicates;
    state.merge_stats.copied += tally.copied;
    state.merge_stats.duplicates += tally.duplicates;
    state.merge_stats.size_copied_bytes += tally.bytes;

    if let Some(first) = tally.errors.first() {
        return FolderStatus::Failed(first.clone());
    }

    // 签名阶段已经哈希过，这里只读缓存
    for file in &member.files {
        if let Outcome::Done(key) = state.hash_cache.key_for(&file.path, cancel).await {
            state.seen.insert(key);
        }
    }
    state.absorbed.insert(member.path.clone());
    FolderStatus::Copied
}
