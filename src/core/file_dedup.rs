//! 逐文件去重：处理目录合并之后剩下的文件

use crate::config::ConflictPolicy;
use crate::core::copy::{copy_file, exists, unique_destination};
use crate::core::dest_index::DestinationIndex;
use crate::core::signature::normalize_relative;
use crate::core::state::{send_progress, ProgressTx, RunState};
use crate::error::Outcome;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 从断点开始逐个处理扁平文件列表
///
/// 暂停时断点停在当前文件上，恢复后该文件会被重新处理。
pub async fn run_file_dedup(
    state: &mut RunState,
    index: &DestinationIndex,
    policy: ConflictPolicy,
    cancel: &CancellationToken,
    progress: &ProgressTx,
) -> Outcome<()> {
    info!(
        "文件去重: 从第 {} 个开始, 共 {} 个",
        state.cursor,
        state.files.len()
    );

    while state.cursor < state.files.len() {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let file = state.files[state.cursor].clone();
        if state.is_absorbed(&file.folder_path) {
            state.cursor += 1;
            continue;
        }

        let key = match state.hash_cache.key_for(&file.path, cancel).await {
            Outcome::Done(key) => key,
            Outcome::Cancelled => return Outcome::Cancelled,
            Outcome::Failed(e) => {
                warn!("跳过无法读取的文件: {}", e);
                state.cursor += 1;
                continue;
            }
        };
        state.file_stats.scanned += 1;

        if state.seen.contains(&key) || index.contains(&key) {
            debug!("重复文件: {}", file.path.display());
            state.file_stats.duplicates += 1;
        } else {
            let mut target = state
                .request
                .destination
                .join(normalize_relative(&file.folder_relative_path))
                .join(&file.name);

            let mut skip = false;
            if exists(&target).await {
                match policy {
                    ConflictPolicy::Rename => target = unique_destination(&target).await,
                    ConflictPolicy::Skip => {
                        debug!("同名文件已存在，跳过: {}", target.display());
                        state.file_stats.duplicates += 1;
                        skip = true;
                    }
                }
            }

            if !skip {
                match copy_file(&file.path, &target).await {
                    Ok(bytes) => {
                        debug!("复制: {} -> {}", file.path.display(), target.display());
                        state.file_stats.copied += 1;
                        state.file_stats.size_copied_bytes += bytes;
                        state.seen.insert(key);
                    }
                    Err(e) => warn!("复制文件失败: {}", e),
                }
            }
        }

        state.cursor += 1;
        send_progress(progress, state.progress(file.path.display().to_string())).await;
    }

    info!(
        "文件去重完成: 复制 {} 个, 重复 {} 个",
        state.file_stats.copied, state.file_stats.duplicates
    );
    Outcome::Done(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::FileFilter;
    use crate::core::hasher::HashCache;
    use crate::core::scanner::FileScanner;
    use crate::core::state::{RunPhase, RunRequest};
    use std::fs;
    use std::path::Path;
    use tokio::sync::mpsc;

    async fn prepared_state(src: &Path, dest: &Path) -> (RunState, DestinationIndex) {
        let token = CancellationToken::new();
        let mut state = RunState::new(RunRequest::new(
            vec![src.to_path_buf()],
            dest.to_path_buf(),
            &[],
        ));
        let scan = FileScanner::new(FileFilter::allow_all(), token.clone())
            .scan(src)
            .await;
        state.load_scan(scan);
        let mut cache = HashCache::new();
        let index = DestinationIndex::build(dest, &FileFilter::allow_all(), &mut cache, &token)
            .await
            .done()
            .unwrap();
        (state, index)
    }

    #[tokio::test]
    async fn test_dedup_against_run_and_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(src.join("docs_copy/sub")).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(src.join("a.txt"), b"alpha").unwrap();
        fs::write(src.join("docs_copy/a_again.txt"), b"alpha").unwrap();
        fs::write(src.join("docs_copy/old.txt"), b"already there").unwrap();
        fs::write(src.join("docs_copy/sub/new.txt"), b"new").unwrap();
        fs::write(dest.join("existing.txt"), b"already there").unwrap();

        let (mut state, index) = prepared_state(&src, &dest).await;
        let token = CancellationToken::new();
        run_file_dedup(&mut state, &index, ConflictPolicy::Rename, &token, &None)
            .await
            .done()
            .unwrap();

        assert_eq!(state.file_stats.scanned, 4);
        assert_eq!(state.file_stats.copied, 2);
        assert_eq!(state.file_stats.duplicates, 2);
        assert_eq!(state.file_stats.size_copied_bytes, 8);
        assert!(dest.join("a.txt").exists());
        // 目录名的每一段都做了规范化
        assert!(dest.join("docs/sub/new.txt").exists());
        assert!(!dest.join("docs/a_again.txt").exists());
        assert_eq!(state.cursor, state.files.len());
    }

    #[tokio::test]
    async fn test_absorbed_folders_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(src.join("pics/p1")).unwrap();
        fs::write(src.join("pics/p1/x.png"), b"x").unwrap();
        fs::write(src.join("loose.png"), b"loose").unwrap();

        let (mut state, index) = prepared_state(&src, &dest).await;
        state.absorbed.insert(src.join("pics"));
        let token = CancellationToken::new();
        run_file_dedup(&mut state, &index, ConflictPolicy::Rename, &token, &None)
            .await
            .done()
            .unwrap();

        assert_eq!(state.file_stats.scanned, 1);
        assert!(dest.join("loose.png").exists());
        assert!(!dest.join("pics").exists());
    }

    #[tokio::test]
    async fn test_name_conflict_policies() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("img.png"), b"source image").unwrap();

        for (policy, expect_copied) in [(ConflictPolicy::Rename, 1), (ConflictPolicy::Skip, 0)] {
            let dest = dir.path().join(format!("dest_{:?}", policy));
            fs::create_dir_all(&dest).unwrap();
            fs::write(dest.join("img.png"), b"different image").unwrap();

            let (mut state, index) = prepared_state(&src, &dest).await;
            let token = CancellationToken::new();
            run_file_dedup(&mut state, &index, policy, &token, &None)
                .await
                .done()
                .unwrap();

            assert_eq!(state.file_stats.copied, expect_copied);
            assert_eq!(fs::read(dest.join("img.png")).unwrap(), b"different image");
            assert_eq!(dest.join("img_1.png").exists(), expect_copied == 1);
        }
    }

    #[tokio::test]
    async fn test_paused_before_first_file_keeps_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();

        let (mut state, index) = prepared_state(&src, &dest).await;
        let token = CancellationToken::new();
        token.cancel();
        let result = run_file_dedup(&mut state, &index, ConflictPolicy::Rename, &token, &None).await;
        assert!(result.is_cancelled());
        assert_eq!(state.cursor, 0);
        assert_eq!(state.file_stats.scanned, 0);
    }

    #[tokio::test]
    async fn test_resume_reprocesses_interrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("0.txt"), b"zero").unwrap();
        fs::write(src.join("1.txt"), b"one").unwrap();

        let (mut state, index) = prepared_state(&src, &dest).await;
        state.phase = RunPhase::FileDedup;

        // 进度通道先占满：第一个文件复制完后发送进度会阻塞，此时请求暂停
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        tx.send(state.progress("queued")).await.unwrap();
        let tx = Some(tx);
        let pauser = {
            let token = token.clone();
            let first = dest.join("0.txt");
            async move {
                while !first.exists() {
                    tokio::task::yield_now().await;
                }
                token.cancel();
                rx.recv().await;
            }
        };
        let (result, _) = tokio::join!(
            run_file_dedup(&mut state, &index, ConflictPolicy::Rename, &token, &tx),
            pauser
        );
        assert!(result.is_cancelled());
        assert_eq!(state.cursor, 1);
        assert_eq!(state.file_stats.copied, 1);
        assert!(dest.join("0.txt").exists());
        assert!(!dest.join("1.txt").exists());

        // 恢复：新的令牌，从断点继续
        let token = CancellationToken::new();
        run_file_dedup(&mut state, &index, ConflictPolicy::Rename, &token, &None)
            .await
            .done()
            .unwrap();

        assert_eq!(state.file_stats.copied, 2);
        assert_eq!(state.file_stats.scanned, 2);
        assert!(dest.join("1.txt").exists());
        assert!(!dest.join("0_1.txt").exists());
    }
}
