//! 内容哈希 - 流式计算文件 BLAKE3 摘要，支持暂停

use crate::error::{MergeError, Outcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// 每次读取的块大小
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// 内容标识：(大小, 哈希)，与文件名和位置无关
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub size: u64,
    pub hash: String,
}

impl ContentKey {
    /// 读取文件大小并计算哈希
    pub async fn of(path: &Path, cancel: &CancellationToken) -> Outcome<ContentKey> {
        let size = match tokio::fs::metadata(path).await {
            Ok(m) => m.len(),
            Err(e) => return Outcome::Failed(MergeError::io(path, e)),
        };
        hash_file(path, cancel).await.map(|hash| ContentKey { size, hash })
    }
}

/// 流式计算文件哈希（256 位 BLAKE3，十六进制）
///
/// 每读一块之前检查暂停信号；一旦暂停，已经读入的部分全部丢弃。
pub async fn hash_file(path: &Path, cancel: &CancellationToken) -> Outcome<String> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) => return Outcome::Failed(MergeError::io(path, e)),
    };

    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        let n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => return Outcome::Failed(MergeError::io(path, e)),
        };
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Outcome::Done(hasher.finalize().to_hex().to_string())
}

#[derive(Debug, Clone)]
struct CachedKey {
    modified: Option<SystemTime>,
    key: ContentKey,
}

/// 运行期哈希缓存，恢复运行时不必重新计算已完成的文件
///
/// 以路径为键，文件大小或修改时间变化时失效。
#[derive(Debug, Default)]
pub struct HashCache {
    entries: HashMap<PathBuf, CachedKey>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 获取文件的 ContentKey，命中缓存时不读取文件内容
    pub async fn key_for(&mut self, path: &Path, cancel: &CancellationToken) -> Outcome<ContentKey> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => return Outcome::Failed(MergeError::io(path, e)),
        };
        let modified = meta.modified().ok();

        if let Some(cached) = self.entries.get(path) {
            if cached.key.size == meta.len() && cached.modified == modified {
                return Outcome::Done(cached.key.clone());
            }
        }

        let hash = crate::try_outcome!(hash_file(path, cancel).await);
        let key = ContentKey {
            size: meta.len(),
            hash,
        };
        self.entries.insert(
            path.to_path_buf(),
            CachedKey {
                modified,
                key: key.clone(),
            },
        );
        Outcome::Done(key)
    }
}
