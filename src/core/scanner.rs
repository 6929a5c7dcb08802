use crate::core::filter::FileFilter;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 扫描到的文件
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub name: String,
    /// 相对于扫描根目录
    pub relative_path: PathBuf,
    pub folder_path: PathBuf,
    pub folder_relative_path: PathBuf,
}

/// 扫描到的目录，只记录直接子项
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub path: PathBuf,
    /// 根目录本身为空路径
    pub relative_path: PathBuf,
    pub files: Vec<FileRecord>,
    pub subfolders: Vec<PathBuf>,
    pub is_leaf: bool,
}

impl FolderRecord {
    /// 目录名（根目录取其自身的名字）
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// 扫描结果
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// 所有匹配文件的扁平列表
    pub files: Vec<FileRecord>,
    /// 目录树：绝对路径 -> 目录记录
    pub folders: BTreeMap<PathBuf, FolderRecord>,
    /// 扫描途中被暂停，结果不完整
    pub incomplete: bool,
}

impl ScanResult {
    pub fn leaf_folders(&self) -> impl Iterator<Item = &FolderRecord> {
        self.folders.values().filter(|f| f.is_leaf)
    }

    fn extend(&mut self, other: ScanResult) {
        self.files.extend(other.files);
        self.folders.extend(other.folders);
        self.incomplete |= other.incomplete;
    }
}

#[derive(Default)]
struct DirAcc {
    relative_path: PathBuf,
    files: Vec<FileRecord>,
    subfolders: Vec<PathBuf>,
}

/// 目录扫描器
pub struct FileScanner {
    filter: FileFilter,
    cancel: CancellationToken,
}

impl FileScanner {
    pub fn new(filter: FileFilter, cancel: CancellationToken) -> Self {
        Self { filter, cancel }
    }

    /// 依次扫描多个根目录并合并结果
    pub async fn scan_roots(&self, roots: &[PathBuf]) -> ScanResult {
        let mut combined = ScanResult::default();
        for root in roots {
            if self.cancel.is_cancelled() {
                combined.incomplete = true;
                break;
            }
            combined.extend(self.scan(root).await);
        }
        combined
    }

    /// 扫描单个根目录
    pub async fn scan(&self, root: &Path) -> ScanResult {
        let root = root.to_path_buf();
        let filter = self.filter.clone();
        let cancel = self.cancel.clone();

        match tokio::task::spawn_blocking(move || scan_blocking(&root, &filter, &cancel)).await {
            Ok(result) => result,
            Err(e) => {
                warn!("扫描任务失败: {}", e);
                ScanResult::default()
            }
        }
    }
}

fn scan_blocking(root: &Path, filter: &FileFilter, cancel: &CancellationToken) -> ScanResult {
    info!("开始扫描: {}", root.display());

    let mut result = ScanResult::default();
    if let Err(e) = std::fs::read_dir(root) {
        warn!("无法读取根目录 {}: {}", root.display(), e);
        return result;
    }

    let mut dirs: HashMap<PathBuf, DirAcc> = HashMap::new();
    dirs.insert(root.to_path_buf(), DirAcc::default());
    // 保持目录的发现顺序
    let mut dir_order = vec![root.to_path_buf()];

    let mut it = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter();

    loop {
        let entry = match it.next() {
            None => break,
            Some(Ok(e)) => e,
            Some(Err(e)) => {
                debug!("跳过无法访问的条目: {}", e);
                continue;
            }
        };

        if cancel.is_cancelled() {
            // 放弃当前目录剩余的条目
            result.incomplete = true;
            if entry.file_type().is_dir() {
                it.skip_current_dir();
            }
            continue;
        }

        let path = entry.path();
        let parent = match path.parent() {
            Some(p) => p.to_path_buf(),
            None => continue,
        };
        let relative = match path.strip_prefix(root) {
            Ok(r) => r.to_path_buf(),
            Err(_) => continue,
        };

        if entry.file_type().is_dir() {
            if let Some(acc) = dirs.get_mut(&parent) {
                acc.subfolders.push(relative.clone());
            }
            dirs.insert(
                path.to_path_buf(),
                DirAcc {
                    relative_path: relative,
                    ..Default::default()
                },
            );
            dir_order.push(path.to_path_buf());
            continue;
        }

        if !entry.file_type().is_file() || !filter.allows(path) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                debug!("读取元数据失败 {}: {}", path.display(), e);
                continue;
            }
        };

        let Some(acc) = dirs.get_mut(&parent) else {
            continue;
        };
        let record = FileRecord {
            path: path.to_path_buf(),
            size,
            name: entry.file_name().to_string_lossy().into_owned(),
            relative_path: relative,
            folder_path: parent,
            folder_relative_path: acc.relative_path.clone(),
        };
        acc.files.push(record.clone());
        result.files.push(record);
    }

    for path in dir_order {
        let Some(acc) = dirs.remove(&path) else {
            continue;
        };
        if acc.files.is_empty() && acc.subfolders.is_empty() {
            continue;
        }
        let is_leaf = acc.subfolders.is_empty();
        result.folders.insert(
            path.clone(),
            FolderRecord {
                path,
                relative_path: acc.relative_path,
                files: acc.files,
                subfolders: acc.subfolders,
                is_leaf,
            },
        );
    }

    info!(
        "扫描完成: {} 个文件, {} 个目录{}",
        result.files.len(),
        result.folders.len(),
        if result.incomplete { " (已暂停，不完整)" } else { "" }
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::create_dir_all(root.join("pics/p1")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("top.txt"), b"top").unwrap();
        fs::write(root.join("docs/a.txt"), b"x").unwrap();
        fs::write(root.join("docs/b.md"), b"md").unwrap();
        fs::write(root.join("pics/p1/img.png"), b"png").unwrap();
    }

    #[tokio::test]
    async fn test_scan_builds_records() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());

        let scanner = FileScanner::new(FileFilter::allow_all(), CancellationToken::new());
        let result = scanner.scan(dir.path()).await;

        assert!(!result.incomplete);
        assert_eq!(result.files.len(), 4);

        let img = result.files.iter().find(|f| f.name == "img.png").unwrap();
        assert_eq!(img.relative_path, Path::new("pics/p1/img.png"));
        assert_eq!(img.folder_relative_path, Path::new("pics/p1"));
        assert_eq!(img.size, 3);

        // 空目录不出现在目录树中
        assert!(!result.folders.contains_key(&dir.path().join("empty")));

        let root = &result.folders[dir.path()];
        assert!(!root.is_leaf);
        assert_eq!(root.relative_path, PathBuf::new());
        assert_eq!(root.files.len(), 1);

        let pics = &result.folders[&dir.path().join("pics")];
        assert!(!pics.is_leaf);
        assert!(pics.files.is_empty());

        let docs = &result.folders[&dir.path().join("docs")];
        assert!(docs.is_leaf);
        assert_eq!(docs.files.len(), 2);
    }

    #[tokio::test]
    async fn test_extension_filter_and_leaf_status() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());

        let filter = FileFilter::new(&["png"], &[]);
        let scanner = FileScanner::new(filter, CancellationToken::new());
        let result = scanner.scan(dir.path()).await;

        assert_eq!(result.files.len(), 1);
        // docs 没有匹配文件也没有子目录，被省略
        assert!(!result.folders.contains_key(&dir.path().join("docs")));
        // 根目录仍有子目录，因此不是叶子
        assert!(!result.folders[dir.path()].is_leaf);
        let leaves: Vec<_> = result.leaf_folders().map(|f| f.name()).collect();
        assert_eq!(leaves, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = FileScanner::new(FileFilter::allow_all(), CancellationToken::new());
        let result = scanner.scan(&dir.path().join("nope")).await;
        assert!(result.files.is_empty());
        assert!(result.folders.is_empty());
    }

    #[tokio::test]
    async fn test_paused_scan_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());

        let token = CancellationToken::new();
        token.cancel();
        let scanner = FileScanner::new(FileFilter::allow_all(), token);
        let result = scanner.scan(dir.path()).await;
        assert!(result.incomplete);
        assert!(result.files.is_empty());
    }
}
