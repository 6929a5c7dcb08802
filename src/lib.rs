use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use commands::events::AppEvent;
pub use config::{ConflictPolicy, MergeConfig};
pub use crate::core::{MergeEngine, MergeGroup, RunState, RunStats, RunSummary};
pub use error::{MergeError, Outcome};

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 应用状态，在命令之间共享
#[derive(Clone)]
pub struct AppState {
    pub config_dir: PathBuf,
    /// 上一次运行的状态，暂停后用于恢复
    pub run_state: Arc<Mutex<Option<RunState>>>,
    /// 当前任务的暂停令牌
    pub pause_token: Arc<Mutex<Option<CancellationToken>>>,
    /// 同一时间只允许一个任务
    pub running: Arc<AtomicBool>,
    pub events: mpsc::Sender<AppEvent>,
}

impl AppState {
    /// 创建应用状态，返回事件接收端
    pub fn new(config_dir: PathBuf) -> anyhow::Result<(Self, mpsc::Receiver<AppEvent>)> {
        std::fs::create_dir_all(&config_dir)?;
        tracing::debug!("配置目录: {:?}", config_dir);

        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let state = Self {
            config_dir,
            run_state: Arc::new(Mutex::new(None)),
            pause_token: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            events,
        };
        Ok((state, rx))
    }

    /// 默认配置目录
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("foldermerge"))
            .unwrap_or_else(|| PathBuf::from(".foldermerge"))
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig::load(&self.config_dir)
    }

    /// 暂停正在进行的任务（应用关闭时调用）
    pub async fn cleanup(&self) {
        if let Some(token) = self.pause_token.lock().await.as_ref() {
            tracing::info!("正在暂停进行中的任务...");
            token.cancel();
        }
    }
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            // Linux：优先 XDG_CONFIG_HOME
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
