//! 目标目录索引：全局内容集合 + 顶层目录签名

use crate::core::filter::FileFilter;
use crate::core::hasher::{ContentKey, HashCache};
use crate::core::scanner::{FileRecord, FolderRecord};
use crate::core::signature::{build_signature, FolderSignature};
use crate::error::{MergeError, Outcome};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 目标目录索引
#[derive(Debug, Default)]
pub struct DestinationIndex {
    /// 目标目录下所有文件的内容标识
    pub keys: HashSet<ContentKey>,
    /// 顶层子目录签名：digest -> 目录路径
    pub folder_signatures: HashMap<String, PathBuf>,
}

impl DestinationIndex {
    /// 扫描并哈希整个目标目录
    pub async fn build(
        root: &Path,
        filter: &FileFilter,
        cache: &mut HashCache,
        cancel: &CancellationToken,
    ) -> Outcome<DestinationIndex> {
        if let Err(e) = tokio::fs::create_dir_all(root).await {
            return Outcome::Failed(MergeError::Structural(format!(
                "无法创建目标目录 {}: {}",
                root.display(),
                e
            )));
        }

        info!("开始索引目标目录: {}", root.display());
        let mut index = DestinationIndex {
            keys: crate::try_outcome!(collect_keys(root, cache, cancel).await),
            ..Default::default()
        };

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(rd) => rd,
            Err(e) => {
                return Outcome::Failed(MergeError::Structural(format!(
                    "无法读取目标目录 {}: {}",
                    root.display(),
                    e
                )))
            }
        };

        loop {
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            let entry = match entries.next_entry().await {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(e) => {
                    debug!("读取目标目录条目失败: {}", e);
                    continue;
                }
            };
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }

            let path = entry.path();
            let folder = shallow_folder(&path, filter).await;
            let signature: FolderSignature =
                crate::try_outcome!(build_signature(&folder, cache, cancel).await);
            if signature.is_empty() {
                continue;
            }
            debug!("目标目录签名: {} -> {}", path.display(), &signature.digest[..16]);
            index.folder_signatures.insert(signature.digest, path);
        }

        info!(
            "目标索引完成: {} 个文件内容, {} 个顶层目录签名",
            index.keys.len(),
            index.folder_signatures.len()
        );
        Outcome::Done(index)
    }

    pub fn contains(&self, key: &ContentKey) -> bool {
        self.keys.contains(key)
    }

    /// 查找内容完全相同的顶层目标目录
    pub fn matching_folder(&self, signature: &FolderSignature) -> Option<&Path> {
        if signature.is_empty() {
            return None;
        }
        self.folder_signatures
            .get(&signature.digest)
            .map(|p| p.as_path())
    }
}

/// 递归列出目录下的所有文件
pub async fn list_files(root: &Path) -> Vec<PathBuf> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    })
    .await
    .unwrap_or_else(|e| {
        warn!("列出文件失败: {}", e);
        Vec::new()
    })
}

/// 递归哈希目录下的所有文件，返回内容集合
///
/// 单个文件失败会被跳过。
pub async fn collect_keys(
    root: &Path,
    cache: &mut HashCache,
    cancel: &CancellationToken,
) -> Outcome<HashSet<ContentKey>> {
    let mut keys = HashSet::new();
    for path in list_files(root).await {
        match cache.key_for(&path, cancel).await {
            Outcome::Done(key) => {
                keys.insert(key);
            }
            Outcome::Cancelled => return Outcome::Cancelled,
            Outcome::Failed(e) => debug!("跳过无法哈希的文件: {}", e),
        }
    }
    Outcome::Done(keys)
}

/// 只读取目录的直接文件，构造目录记录
async fn shallow_folder(path: &Path, filter: &FileFilter) -> FolderRecord {
    let mut files = Vec::new();
    let mut subfolders = Vec::new();

    if let Ok(mut rd) = tokio::fs::read_dir(path).await {
        while let Ok(Some(entry)) = rd.next_entry().await {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let child = entry.path();
            if meta.is_dir() {
                subfolders.push(PathBuf::from(entry.file_name()));
            } else if meta.is_file() && filter.allows(&child) {
                files.push(FileRecord {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: meta.len(),
                    relative_path: PathBuf::from(entry.file_name()),
                    folder_path: path.to_path_buf(),
                    folder_relative_path: PathBuf::new(),
                    path: child,
                });
            }
        }
    }

    FolderRecord {
        path: path.to_path_buf(),
        relative_path: PathBuf::new(),
        is_leaf: subfolders.is_empty(),
        files,
        subfolders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_index_keys_and_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        fs::create_dir_all(dest.join("Trip/nested")).unwrap();
        fs::create_dir_all(dest.join("Empty")).unwrap();
        fs::write(dest.join("loose.txt"), b"loose").unwrap();
        fs::write(dest.join("Trip/a.jpg"), b"aaaa").unwrap();
        fs::write(dest.join("Trip/nested/deep.jpg"), b"deep").unwrap();

        let token = CancellationToken::new();
        let mut cache = HashCache::new();
        let index = DestinationIndex::build(&dest, &FileFilter::allow_all(), &mut cache, &token)
            .await
            .done()
            .unwrap();

        assert_eq!(index.keys.len(), 3);
        // 空目录没有签名，Trip 的签名不包含 nested 下的文件
        assert_eq!(index.folder_signatures.len(), 1);

        let sig = crate::core::signature::signature_from_entries(vec![(
            "a.jpg".into(),
            4,
            blake3::hash(b"aaaa").to_hex().to_string(),
        )]);
        assert_eq!(index.matching_folder(&sig), Some(dest.join("Trip").as_path()));
    }

    #[tokio::test]
    async fn test_missing_destination_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("new/dest");
        let token = CancellationToken::new();
        let mut cache = HashCache::new();
        let index = DestinationIndex::build(&dest, &FileFilter::allow_all(), &mut cache, &token)
            .await
            .done()
            .unwrap();
        assert!(dest.is_dir());
        assert!(index.keys.is_empty());
    }

    #[tokio::test]
    async fn test_paused_indexing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut cache = HashCache::new();
        let result =
            DestinationIndex::build(dir.path(), &FileFilter::allow_all(), &mut cache, &token).await;
        assert!(result.is_cancelled());
    }
}
