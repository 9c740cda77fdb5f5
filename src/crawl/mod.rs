//! 目录树抓取。
//!
//! 子模块：
//! - `queue`     — 带关闭标记的有界工作队列
//! - `models`    — 抓取参数、结果集、路径规范化
//! - `collector` — 文件结果收集与结束判定
//! - `crawler`   — 工作线程池与抓取主流程

pub(crate) mod collector;
pub mod crawler;
pub mod models;
pub mod queue;

pub use crawler::TreeCrawler;
pub use models::{CompletionPolicy, CrawlOptions, CrawlResultSet};
