//! 递归复制 / 合并原语

use crate::core::filter::FileFilter;
use crate::core::hasher::{ContentKey, HashCache};
use crate::error::{MergeError, Outcome};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 一次复制/合并的统计
#[derive(Debug, Default)]
pub struct CopyTally {
    pub copied: u64,
    pub duplicates: u64,
    pub bytes: u64,
    pub errors: Vec<String>,
}

impl CopyTally {
    fn record_error(&mut self, err: MergeError) {
        warn!("复制失败: {}", err);
        self.errors.push(err.to_string());
    }
}

/// 文件名冲突时生成不冲突的路径：`name_1.ext`, `name_2.ext`, ...
pub async fn unique_destination(path: &Path) -> PathBuf {
    if !exists(path).await {
        return path.to_path_buf();
    }

    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = parent.join(format!("{}_{}{}", stem, n, ext));
        if !exists(&candidate).await {
            return candidate;
        }
        n += 1;
    }
}

pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// 复制单个文件（整文件操作）
pub async fn copy_file(from: &Path, to: &Path) -> Result<u64, MergeError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MergeError::io(parent, e))?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| MergeError::io(from, e))
}

/// 直接镜像复制整个子树，不做内容判重
///
/// 暂停时立即停止，已经复制的部分保持原样。
pub async fn copy_tree(
    src: &Path,
    dst: &Path,
    filter: &FileFilter,
    cancel: &CancellationToken,
) -> Outcome<CopyTally> {
    let mut tally = CopyTally::default();
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from_dir, to_dir)) = stack.pop() {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        let Some(files) = enter_dir(&from_dir, &to_dir, filter, &mut stack, &mut tally).await else {
            continue;
        };

        for file in files {
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            let Some(name) = file.file_name() else { continue };
            match copy_file(&file, &to_dir.join(name)).await {
                Ok(bytes) => {
                    tally.copied += 1;
                    tally.bytes += bytes;
                }
                Err(e) => tally.record_error(e),
            }
        }
    }

    Outcome::Done(tally)
}

/// 按内容合并子树：内容已在 `known` 中的文件不再复制
///
/// 同名但内容不同的文件改名为 `name_N.ext` 后复制。
pub async fn merge_tree(
    src: &Path,
    dst: &Path,
    filter: &FileFilter,
    known: &mut HashSet<ContentKey>,
    cache: &mut HashCache,
    cancel: &CancellationToken,
) -> Outcome<CopyTally> {
    let mut tally = CopyTally::default();
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from_dir, to_dir)) = stack.pop() {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        let Some(files) = enter_dir(&from_dir, &to_dir, filter, &mut stack, &mut tally).await else {
            continue;
        };

        for file in files {
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            let key = match cache.key_for(&file, cancel).await {
                Outcome::Done(k) => k,
                Outcome::Cancelled => return Outcome::Cancelled,
                Outcome::Failed(e) => {
                    tally.record_error(e);
                    continue;
                }
            };
            if known.contains(&key) {
                debug!("内容已存在，跳过: {}", file.display());
                tally.duplicates += 1;
                continue;
            }

            let Some(name) = file.file_name() else { continue };
            let target = unique_destination(&to_dir.join(name)).await;
            match copy_file(&file, &target).await {
                Ok(bytes) => {
                    tally.copied += 1;
                    tally.bytes += bytes;
                    known.insert(key);
                }
                Err(e) => tally.record_error(e),
            }
        }
    }

    Outcome::Done(tally)
}

/// 创建目标目录并读取源目录，子目录压栈，返回要处理的文件
async fn enter_dir(
    from_dir: &Path,
    to_dir: &Path,
    filter: &FileFilter,
    stack: &mut Vec<(PathBuf, PathBuf)>,
    tally: &mut CopyTally,
) -> Option<Vec<PathBuf>> {
    if let Err(e) = tokio::fs::create_dir_all(to_dir).await {
        tally.record_error(MergeError::io(to_dir, e));
        return None;
    }
    let (files, subdirs) = match read_children(from_dir, filter).await {
        Ok(children) => children,
        Err(e) => {
            tally.record_error(e);
            return None;
        }
    };
    // 逆序压栈，出栈时按名字顺序处理
    for sub in subdirs.into_iter().rev() {
        if let Some(name) = sub.file_name() {
            let target = to_dir.join(name);
            stack.push((sub, target));
        }
    }
    Some(files)
}

/// 读取目录的直接子项：(允许的文件, 子目录)，均按名字排序
async fn read_children(
    dir: &Path,
    filter: &FileFilter,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), MergeError> {
    let mut rd = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| MergeError::io(dir, e))?;
    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    loop {
        match rd.next_entry().await {
            Ok(Some(entry)) => {
                let Ok(ft) = entry.file_type().await else {
                    continue;
                };
                let path = entry.path();
                if ft.is_dir() {
                    subdirs.push(path);
                } else if ft.is_file() && filter.allows(&path) {
                    files.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("读取目录条目失败 {}: {}", dir.display(), e);
                break;
            }
        }
    }
    files.sort();
    subdirs.sort();
    Ok((files, subdirs))
}
