//! 下载参数、结果与错误类型。

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::remote::FetchError;

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    /// 全部路径入队后、关闭队列前的固定等待。
    pub settle_delay: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            workers: 40,
            queue_capacity: 1024,
            settle_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub failed: usize,
}

/// 整个下载无法开始时返回；单个文件的失败只计数。
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("cannot prepare target directory {path}: {source}")]
    TargetDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no download worker could be started: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Error)]
pub(crate) enum FileError {
    #[error("refusing to write outside target directory: {0}")]
    UnsafePath(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
