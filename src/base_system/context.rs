//! 模拟配置结构（SimConfig）与默认值。
//!
//! 该模块同时提供生成 `simconfig.yml` 的字段元信息，以及把配置换算成
//! 抓取/下载参数的辅助方法。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};
use crate::crawl::{CompletionPolicy, CrawlOptions};
use crate::download::DownloadOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub metric_poll: MetricPollConfig,
    #[serde(default)]
    pub remote_http_conn: RemoteHttpConnConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub db_conn: DbConnConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPollConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,
    #[serde(default = "default_metric_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteHttpConnConfig {
    #[serde(default)]
    pub remote_repos: Vec<String>,
    #[serde(default = "default_false")]
    pub auto_discover: bool,
    #[serde(default = "default_target_dir")]
    pub target_dir: String,
    #[serde(default = "default_true")]
    pub recreate_repos: bool,
    #[serde(default = "default_false")]
    pub repeat: bool,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    #[serde(default = "default_repeat_freq_secs")]
    pub repeat_freq_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    Quiescence,
    Tracked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default = "default_crawler_workers")]
    pub workers: usize,
    #[serde(default = "default_folder_queue_capacity")]
    pub folder_queue_capacity: usize,
    #[serde(default = "default_file_queue_capacity")]
    pub file_queue_capacity: usize,
    #[serde(default = "default_quiescence_timeout_secs")]
    pub quiescence_timeout_secs: u64,
    #[serde(default = "default_completion")]
    pub completion: CompletionMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    #[serde(default = "default_downloader_workers")]
    pub workers: usize,
    #[serde(default = "default_file_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConnConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,
    #[serde(default = "default_db_workers")]
    pub num_workers: usize,
    #[serde(default = "default_db_iters")]
    pub num_iters_by_worker: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(default = "default_delete_retry_secs")]
    pub delete_retry_secs: u64,
    #[serde(default = "default_delete_max_attempts")]
    pub delete_max_attempts: u32,
    #[serde(default = "default_post_delete_pause_secs")]
    pub post_delete_pause_secs: u64,
    #[serde(default = "default_assumed_offline_period_secs")]
    pub assumed_offline_period_secs: u64,
}

impl Default for MetricPollConfig {
    fn default() -> Self {
        Self {
            enabled: default_false(),
            interval_secs: default_metric_interval_secs(),
        }
    }
}

impl Default for RemoteHttpConnConfig {
    fn default() -> Self {
        Self {
            remote_repos: Vec::new(),
            auto_discover: default_false(),
            target_dir: default_target_dir(),
            recreate_repos: default_true(),
            repeat: default_false(),
            repeat_count: default_repeat_count(),
            repeat_freq_secs: default_repeat_freq_secs(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_crawler_workers(),
            folder_queue_capacity: default_folder_queue_capacity(),
            file_queue_capacity: default_file_queue_capacity(),
            quiescence_timeout_secs: default_quiescence_timeout_secs(),
            completion: default_completion(),
        }
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            workers: default_downloader_workers(),
            queue_capacity: default_file_queue_capacity(),
            settle_delay_secs: default_settle_delay_secs(),
        }
    }
}

impl Default for DbConnConfig {
    fn default() -> Self {
        Self {
            enabled: default_false(),
            num_workers: default_db_workers(),
            num_iters_by_worker: default_db_iters(),
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            delete_retry_secs: default_delete_retry_secs(),
            delete_max_attempts: default_delete_max_attempts(),
            post_delete_pause_secs: default_post_delete_pause_secs(),
            assumed_offline_period_secs: default_assumed_offline_period_secs(),
        }
    }
}

impl ConfigSpec for SimConfig {
    const FILE_NAME: &'static str = "simconfig.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 6] = [
            FieldMeta {
                name: "metric_poll",
                description: "目标库指标轮询\nenabled: 是否启用 / interval_secs: 轮询间隔（秒）",
            },
            FieldMeta {
                name: "remote_http_conn",
                description: "远程 HTTP 连接模拟（抓取源库目录树并从目标库批量下载）\nremote_repos: 要抓取的仓库列表（为空且 auto_discover=true 时按缓存体积自动挑选）\ntarget_dir: 本地下载目录 / recreate_repos: 下载前是否在目标库重建仓库\nrepeat / repeat_count / repeat_freq_secs: 是否重复执行、次数与间隔（秒）",
            },
            FieldMeta {
                name: "crawler",
                description: "目录抓取\nworkers: 并发线程数 / folder_queue_capacity, file_queue_capacity: 队列容量\nquiescence_timeout_secs: 多少秒没有新文件即判定抓取结束\ncompletion: 结束判定方式，可选 [quiescence, tracked]",
            },
            FieldMeta {
                name: "downloader",
                description: "批量下载\nworkers: 并发线程数 / queue_capacity: 队列容量\nsettle_delay_secs: 全部路径入队后关闭队列前的等待时间（秒）",
            },
            FieldMeta {
                name: "db_conn",
                description: "数据库连接模拟（AQL 查询）\nenabled: 是否启用 / num_workers: 并发线程数 / num_iters_by_worker: 每个线程的查询次数",
            },
            FieldMeta {
                name: "provisioning",
                description: "目标库仓库重建\ndelete_retry_secs: 删除失败后的重试间隔（秒） / delete_max_attempts: 最大删除尝试次数\npost_delete_pause_secs: 删除后的等待时间（秒） / assumed_offline_period_secs: 新建远程仓库的离线判定周期",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.crawler;
        if c.workers == 0 || c.folder_queue_capacity == 0 || c.file_queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "crawler.workers / 队列容量必须大于 0".to_string(),
            ));
        }
        let d = &self.downloader;
        if d.workers == 0 || d.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "downloader.workers / queue_capacity 必须大于 0".to_string(),
            ));
        }
        if self.db_conn.enabled && self.db_conn.num_workers == 0 {
            return Err(ConfigError::Validation(
                "db_conn.num_workers 必须大于 0".to_string(),
            ));
        }
        if self.metric_poll.enabled && self.metric_poll.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "metric_poll.interval_secs 必须大于 0".to_string(),
            ));
        }
        let r = &self.remote_http_conn;
        if (r.auto_discover || !r.remote_repos.is_empty()) && r.target_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "remote_http_conn.target_dir 不能为空".to_string(),
            ));
        }
        Ok(())
    }
}

impl SimConfig {
    pub fn target_dir(&self) -> PathBuf {
        PathBuf::from(self.remote_http_conn.target_dir.trim())
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        let c = &self.crawler;
        let completion = match c.completion {
            CompletionMode::Quiescence => {
                CompletionPolicy::Quiescence(Duration::from_secs(c.quiescence_timeout_secs))
            }
            CompletionMode::Tracked => CompletionPolicy::Tracked,
        };
        CrawlOptions {
            workers: c.workers,
            folder_queue_capacity: c.folder_queue_capacity,
            file_queue_capacity: c.file_queue_capacity,
            completion,
        }
    }

    pub fn download_options(&self) -> DownloadOptions {
        let d = &self.downloader;
        DownloadOptions {
            workers: d.workers,
            queue_capacity: d.queue_capacity,
            settle_delay: Duration::from_secs(d.settle_delay_secs),
        }
    }
}

fn default_false() -> bool {
    false
}

fn default_true() -> bool {
    true
}

fn default_metric_interval_secs() -> u64 {
    60
}

fn default_target_dir() -> String {
    "./downloads".to_string()
}

fn default_repeat_count() -> u32 {
    1
}

fn default_repeat_freq_secs() -> u64 {
    300
}

fn default_crawler_workers() -> usize {
    8
}

fn default_folder_queue_capacity() -> usize {
    4096
}

fn default_file_queue_capacity() -> usize {
    1024
}

fn default_quiescence_timeout_secs() -> u64 {
    60
}

fn default_completion() -> CompletionMode {
    CompletionMode::Quiescence
}

fn default_downloader_workers() -> usize {
    40
}

fn default_settle_delay_secs() -> u64 {
    60
}

fn default_db_workers() -> usize {
    10
}

fn default_db_iters() -> usize {
    100
}

fn default_delete_retry_secs() -> u64 {
    60
}

fn default_delete_max_attempts() -> u32 {
    10
}

fn default_post_delete_pause_secs() -> u64 {
    5
}

fn default_assumed_offline_period_secs() -> u64 {
    600
}
