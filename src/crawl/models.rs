//! 抓取参数、结果集与路径规范化。

use std::time::Duration;

pub const STORAGE_API: &str = "api/storage";

/// 判定抓取结束的方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// 收集器连续这么久没收到新文件即视为结束；慢子树可能被截断。
    Quiescence(Duration),
    /// 统计未处理完的目录数，归零且文件队列为空时结束。
    ///
    /// 目录队列满时新目录暂存在工作线程本地，不阻塞入队，因此不会死锁；
    /// 代价是这部分不受队列容量约束，每个线程最多暂存约 深度 × 扇出 个目录。
    Tracked,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub workers: usize,
    pub folder_queue_capacity: usize,
    pub file_queue_capacity: usize,
    pub completion: CompletionPolicy,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            workers: 8,
            folder_queue_capacity: 4096,
            file_queue_capacity: 1024,
            completion: CompletionPolicy::Quiescence(Duration::from_secs(60)),
        }
    }
}

/// 抓取得到的文件路径，按收集顺序排列；抓取结束后只读。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlResultSet {
    paths: Vec<String>,
}

impl CrawlResultSet {
    pub(crate) fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.paths.iter()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }
}

impl<'a> IntoIterator for &'a CrawlResultSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

/// 统一成恰好一个前导 `/`、无尾随 `/` 的形式。
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{trimmed}")
}

/// 目录列表请求的 uri：`api/storage/<path>`。
pub fn listing_uri(path: &str) -> String {
    let normalized = normalize_path(path);
    if normalized == "/" {
        STORAGE_API.to_string()
    } else {
        format!("{STORAGE_API}{normalized}")
    }
}

/// 子项 uri 相对于父目录（形如 `/name`），拼成完整路径。
pub fn join_child(parent: &str, child_uri: &str) -> String {
    let parent = normalize_path(parent);
    let child = child_uri.trim_start_matches('/');
    if parent == "/" {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}
