//! 目录树并发抓取。
//!
//! 固定数量的工作线程共享同一个目录队列：取出目录、请求列表、
//! 子目录推回目录队列、文件推入文件队列。收集器判定结束后两个队列都被关闭，
//! 之后发现的文件直接丢弃。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::{Span, debug, error, info, info_span, warn};

use super::collector;
use super::models::{
    CompletionPolicy, CrawlOptions, CrawlResultSet, join_child, listing_uri, normalize_path,
};
use super::queue::{QueueClosed, TrySubmitError, WorkQueue};
use crate::remote::StoreClient;
use crate::remote::models::{ChildEntry, FolderListing};

pub struct TreeCrawler {
    client: Arc<dyn StoreClient>,
    opts: CrawlOptions,
    span: Span,
}

#[derive(Default)]
struct CrawlStats {
    listed: AtomicUsize,
    failed: AtomicUsize,
    skipped_after_close: AtomicUsize,
    late_files: AtomicUsize,
    overflow_peak: AtomicUsize,
}

/// 工作线程共享的状态。
struct Shared<'a> {
    folders: &'a WorkQueue<String>,
    files: &'a WorkQueue<String>,
    in_flight: &'a AtomicUsize,
    tracked: bool,
    stats: &'a CrawlStats,
}

impl TreeCrawler {
    pub fn new(client: Arc<dyn StoreClient>, opts: CrawlOptions, parent: &Span) -> Self {
        Self {
            client,
            opts,
            span: info_span!(parent: parent, "crawl"),
        }
    }

    /// 从 `roots` 出发抓取全部文件路径，收集器判定结束后返回。
    pub fn crawl(&self, roots: &[String]) -> CrawlResultSet {
        let _enter = self.span.enter();

        let roots: Vec<String> = roots
            .iter()
            .filter_map(|r| {
                if r.trim().trim_matches('/').is_empty() {
                    warn!("忽略空的根路径 {:?}", r);
                    None
                } else {
                    Some(normalize_path(r))
                }
            })
            .collect();
        if roots.is_empty() {
            warn!("没有可抓取的根路径");
            return CrawlResultSet::default();
        }

        let folders = WorkQueue::new(self.opts.folder_queue_capacity);
        let files = WorkQueue::new(self.opts.file_queue_capacity);
        let in_flight = AtomicUsize::new(0);
        let stats = CrawlStats::default();
        let tracked = matches!(self.opts.completion, CompletionPolicy::Tracked);
        let shared = Shared {
            folders: &folders,
            files: &files,
            in_flight: &in_flight,
            tracked,
            stats: &stats,
        };

        info!(
            "开始抓取 {} 个根路径，{} 个工作线程，结束判定 {:?}",
            roots.len(),
            self.opts.workers.max(1),
            self.opts.completion
        );

        let collected = thread::scope(|s| {
            let shared = &shared;
            let mut spawned = 0usize;
            for wnum in 0..self.opts.workers.max(1) {
                let span = info_span!(parent: &self.span, "crawl_worker", wnum);
                let client = self.client.as_ref();
                let started = thread::Builder::new()
                    .name(format!("crawl-{wnum}"))
                    .spawn_scoped(s, move || {
                        let _enter = span.enter();
                        worker_loop(client, shared);
                    });
                match started {
                    Ok(_) => spawned += 1,
                    Err(err) => error!("无法启动抓取线程 {}: {}", wnum, err),
                }
            }
            if spawned == 0 {
                error!("没有可用的抓取线程");
                folders.close();
                files.close();
                return Vec::new();
            }

            // 先计入全部根目录，避免计数在播种途中归零
            in_flight.fetch_add(roots.len(), Ordering::SeqCst);
            let seeder_span = info_span!(parent: &self.span, "crawl_seeder");
            let seeded = thread::Builder::new()
                .name("crawl-seeder".to_string())
                .spawn_scoped(s, {
                    let roots = &roots;
                    move || {
                        let _enter = seeder_span.enter();
                        seed(roots, shared);
                    }
                });
            if let Err(err) = seeded {
                error!("无法启动播种线程: {}", err);
                seed(&roots, shared);
            }

            let collected = collector::collect(&files, self.opts.completion, &in_flight);
            folders.close();
            files.close();
            debug!("队列已关闭，等待抓取线程退出");
            collected
        });

        let late = files.drain().len() + stats.late_files.load(Ordering::Relaxed);
        if late > 0 {
            warn!("抓取结束后又发现 {} 个文件，已丢弃", late);
        }
        let peak = stats.overflow_peak.load(Ordering::Relaxed);
        if peak > 0 {
            debug!("单个线程本地暂存目录峰值 {}", peak);
        }
        let skipped = stats.skipped_after_close.load(Ordering::Relaxed);
        if skipped > 0 {
            warn!("抓取结束时仍有 {} 个目录未展开", skipped);
        }
        info!(
            "抓取完成：{} 个文件，展开目录 {} 个，失败 {} 个",
            collected.len(),
            stats.listed.load(Ordering::Relaxed),
            stats.failed.load(Ordering::Relaxed)
        );
        CrawlResultSet::new(collected)
    }
}

fn seed(roots: &[String], shared: &Shared<'_>) {
    for (idx, root) in roots.iter().enumerate() {
        if let Err(QueueClosed(root)) = shared.folders.submit(root.clone()) {
            let remaining = roots.len() - idx;
            shared.in_flight.fetch_sub(remaining, Ordering::SeqCst);
            warn!("目录队列已关闭，{} 起的 {} 个根路径未入队", root, remaining);
            return;
        }
        debug!("根路径 {} 已入队", root);
    }
}

fn worker_loop(client: &dyn StoreClient, shared: &Shared<'_>) {
    // 目录队列满时暂存在本地，避免所有线程都阻塞在入队上；
    // 后进先出消费，峰值不超过 深度 × 扇出
    let mut overflow: Vec<String> = Vec::new();
    loop {
        let folder = match overflow.pop() {
            Some(f) => f,
            None => match shared.folders.next() {
                Some(f) => f,
                None => break,
            },
        };

        if shared.folders.is_closed() {
            shared.stats.skipped_after_close.fetch_add(1, Ordering::Relaxed);
            shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            continue;
        }

        if let Some(listing) = fetch_listing(client, &folder, shared.stats) {
            for child in &listing.children {
                dispatch(&folder, child, shared, &mut overflow);
            }
        }
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
    debug!("抓取线程退出");
}

fn fetch_listing(
    client: &dyn StoreClient,
    folder: &str,
    stats: &CrawlStats,
) -> Option<FolderListing> {
    let uri = listing_uri(folder);
    let body = match client.get_bytes(&uri) {
        Ok(body) => body,
        Err(err) => {
            // 传输失败按空响应处理，由解码失败统一记账
            warn!("请求目录 {} 失败: {}", folder, err);
            Vec::new()
        }
    };
    match serde_json::from_slice::<FolderListing>(&body) {
        Ok(listing) if listing.errors.is_empty() => {
            stats.listed.fetch_add(1, Ordering::Relaxed);
            Some(listing)
        }
        Ok(listing) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!("目录 {} 返回错误 {:?}，跳过该子树", folder, listing.errors);
            None
        }
        Err(err) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!("解析目录 {} 的列表失败: {}，跳过该子树", folder, err);
            None
        }
    }
}

fn dispatch(parent: &str, child: &ChildEntry, shared: &Shared<'_>, overflow: &mut Vec<String>) {
    let path = join_child(parent, &child.uri);
    if !child.folder {
        if shared.files.submit(path).is_err() {
            shared.stats.late_files.fetch_add(1, Ordering::Relaxed);
        }
        return;
    }

    shared.in_flight.fetch_add(1, Ordering::SeqCst);
    if shared.tracked {
        match shared.folders.try_submit(path) {
            Ok(()) => {}
            Err(TrySubmitError::Full(path)) => {
                overflow.push(path);
                shared
                    .stats
                    .overflow_peak
                    .fetch_max(overflow.len(), Ordering::Relaxed);
            }
            Err(TrySubmitError::Closed(_)) => {
                shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    } else if shared.folders.submit(path).is_err() {
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        shared.stats.skipped_after_close.fetch_add(1, Ordering::Relaxed);
    }
}
