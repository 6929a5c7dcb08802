//! 目录签名 - 与枚举顺序无关的目录内容指纹

use crate::core::hasher::HashCache;
use crate::core::scanner::FolderRecord;
use crate::error::Outcome;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 目录签名，只覆盖直接子文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSignature {
    pub digest: String,
    pub file_count: usize,
    pub total_size: u64,
}

impl FolderSignature {
    /// 没有任何可哈希文件的签名，不参与匹配
    pub fn is_empty(&self) -> bool {
        self.file_count == 0
    }
}

/// 目录名截断到第一个下划线之前：`Trip_backup` -> `Trip`
///
/// 以下划线开头的名字截断后为空，此时保留原名。
pub fn normalized_name(name: &str) -> &str {
    match name.split_once('_') {
        Some((head, _)) if !head.is_empty() => head,
        _ => name,
    }
}

/// 对路径的每一段做 [`normalized_name`] 映射
pub fn normalize_relative(path: &Path) -> std::path::PathBuf {
    path.components()
        .map(|c| normalized_name(&c.as_os_str().to_string_lossy()).to_string())
        .collect()
}

/// 近似本地化排序：先不区分大小写比较，再按原始字节
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// 根据文件三元组计算签名
pub fn signature_from_entries(mut entries: Vec<(String, u64, String)>) -> FolderSignature {
    entries.sort_by(|a, b| compare_names(&a.0, &b.0).then_with(|| a.2.cmp(&b.2)));

    let mut hasher = blake3::Hasher::new();
    for (name, size, hash) in &entries {
        hasher.update(format!("{}:{}:{}\n", name, size, hash).as_bytes());
    }

    FolderSignature {
        digest: hasher.finalize().to_hex().to_string(),
        file_count: entries.len(),
        total_size: entries.iter().map(|e| e.1).sum(),
    }
}

/// 计算目录签名，哈希失败的文件直接排除
pub async fn build_signature(
    folder: &FolderRecord,
    cache: &mut HashCache,
    cancel: &CancellationToken,
) -> Outcome<FolderSignature> {
    let mut entries = Vec::with_capacity(folder.files.len());
    for file in &folder.files {
        match cache.key_for(&file.path, cancel).await {
            Outcome::Done(key) => entries.push((file.name.clone(), key.size, key.hash)),
            Outcome::Cancelled => return Outcome::Cancelled,
            Outcome::Failed(e) => debug!("签名时跳过文件: {}", e),
        }
    }
    Outcome::Done(signature_from_entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::FileFilter;
    use crate::core::scanner::FileScanner;
    use std::path::PathBuf;

    #[test]
    fn test_normalized_name() {
        assert_eq!(normalized_name("Alpha"), "Alpha");
        assert_eq!(normalized_name("Alpha_v2"), "Alpha");
        assert_eq!(normalized_name("Alpha_old"), "Alpha");
        assert_eq!(normalized_name("Trip_2_final"), "Trip");
        assert_eq!(normalized_name("_hidden"), "_hidden");
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(
            normalize_relative(Path::new("docs_copy/pics_2")),
            PathBuf::from("docs/pics")
        );
        assert_eq!(normalize_relative(Path::new("")), PathBuf::new());
    }

    #[test]
    fn test_signature_is_order_independent() {
        let a = signature_from_entries(vec![
            ("b.txt".into(), 2, "h2".into()),
            ("A.txt".into(), 1, "h1".into()),
        ]);
        let b = signature_from_entries(vec![
            ("A.txt".into(), 1, "h1".into()),
            ("b.txt".into(), 2, "h2".into()),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.file_count, 2);
        assert_eq!(a.total_size, 3);

        let c = signature_from_entries(vec![("A.txt".into(), 1, "h1".into())]);
        assert_ne!(a.digest, c.digest);
        assert!(signature_from_entries(vec![]).is_empty());
    }

    #[tokio::test]
    async fn test_same_content_different_folder_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Trip", "Trip_2"] {
            let folder = dir.path().join(name);
            std::fs::create_dir_all(&folder).unwrap();
            std::fs::write(folder.join("one.jpg"), b"1111").unwrap();
            std::fs::write(folder.join("two.jpg"), b"22").unwrap();
        }
        std::fs::create_dir_all(dir.path().join("Other")).unwrap();
        std::fs::write(dir.path().join("Other/one.jpg"), b"1111").unwrap();

        let token = CancellationToken::new();
        let scan = FileScanner::new(FileFilter::allow_all(), token.clone())
            .scan(dir.path())
            .await;
        let mut cache = HashCache::new();
        let folder = |name: &str| scan.folders[&dir.path().join(name)].clone();

        let trip = build_signature(&folder("Trip"), &mut cache, &token).await.done().unwrap();
        let trip2 = build_signature(&folder("Trip_2"), &mut cache, &token).await.done().unwrap();
        let other = build_signature(&folder("Other"), &mut cache, &token).await.done().unwrap();

        assert_eq!(trip, trip2);
        assert_eq!(trip.total_size, 6);
        assert_ne!(trip, other);
    }
}
