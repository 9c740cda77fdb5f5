//! 批量下载模块入口。
//!
//! 子模块：
//! - `models`     — 下载参数、结果与错误类型
//! - `progress`   — CLI 进度条
//! - `downloader` — 下载工作池与主流程

pub mod downloader;
pub mod models;
pub(crate) mod progress;

pub use downloader::BulkDownloader;
pub use models::{DownloadOptions, DownloadReport};
