//! 错误类型与三态结果

use std::path::PathBuf;
use thiserror::Error;

/// 合并过程中的错误（取消不算错误，见 [`Outcome`]）
#[derive(Debug, Error)]
pub enum MergeError {
    /// 单个条目的 IO 失败：权限、被并发删除、设备错误等，跳过即可
    #[error("IO 错误 ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 目标不可写、根目录不可读等，只中止受影响的目录组
    #[error("{0}")]
    Structural(String),
}

impl MergeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// 可暂停操作的结果
#[derive(Debug)]
pub enum Outcome<T> {
    Done(T),
    /// 观察到暂停信号，恢复后重试
    Cancelled,
    Failed(MergeError),
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(v) => Outcome::Done(f(v)),
            Outcome::Cancelled => Outcome::Cancelled,
            Outcome::Failed(e) => Outcome::Failed(e),
        }
    }
}

/// 在返回 `Outcome` 的函数里展开结果：取消与失败直接向上传递
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::error::Outcome::Done(v) => v,
            $crate::error::Outcome::Cancelled => return $crate::error::Outcome::Cancelled,
            $crate::error::Outcome::Failed(e) => return $crate::error::Outcome::Failed(e),
        }
    };
}
