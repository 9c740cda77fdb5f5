//! 批量下载：把抓取结果中的每个文件写到目标目录下的同名路径。

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::{Span, debug, error, info, info_span, warn};

use super::models::{DownloadError, DownloadOptions, DownloadReport, FileError};
use super::progress::DownloadProgress;
use crate::crawl::CrawlResultSet;
use crate::crawl::queue::WorkQueue;
use crate::remote::StoreClient;

const LOG_EVERY: usize = 1000;

pub struct BulkDownloader {
    client: Arc<dyn StoreClient>,
    opts: DownloadOptions,
    span: Span,
}

impl BulkDownloader {
    pub fn new(client: Arc<dyn StoreClient>, opts: DownloadOptions, parent: &Span) -> Self {
        Self {
            client,
            opts,
            span: info_span!(parent: parent, "download"),
        }
    }

    /// 阻塞直到所有工作线程退出。只有目标目录无法创建（或一个线程都起不来）时返回错误。
    pub fn download(
        &self,
        results: &CrawlResultSet,
        target_dir: &Path,
    ) -> Result<DownloadReport, DownloadError> {
        let _enter = self.span.enter();
        fs::create_dir_all(target_dir).map_err(|source| DownloadError::TargetDir {
            path: target_dir.to_path_buf(),
            source,
        })?;

        let queue: WorkQueue<String> = WorkQueue::new(self.opts.queue_capacity);
        let downloaded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let progress = DownloadProgress::new(results.len());
        let workers = self.opts.workers.max(1);

        info!(
            "开始下载 {} 个文件到 {}，{} 个工作线程",
            results.len(),
            target_dir.display(),
            workers
        );

        let spawn_error = thread::scope(|s| {
            let mut spawned = 0usize;
            let mut last_error = None;
            for wnum in 0..workers {
                let span = info_span!(parent: &self.span, "download_worker", wnum);
                let queue = &queue;
                let (downloaded, failed, progress) = (&downloaded, &failed, &progress);
                let started = thread::Builder::new()
                    .name(format!("download-{wnum}"))
                    .spawn_scoped(s, move || {
                        let _enter = span.enter();
                        while let Some(rel) = queue.next() {
                            match self.fetch_one(&rel, target_dir) {
                                Ok(bytes) => {
                                    debug!("已下载 {}（{} 字节）", rel, bytes);
                                    downloaded.fetch_add(1, Ordering::Relaxed);
                                    progress.inc(false);
                                }
                                Err(err) => {
                                    warn!("下载 {} 失败: {}", rel, err);
                                    failed.fetch_add(1, Ordering::Relaxed);
                                    progress.inc(true);
                                }
                            }
                        }
                    });
                match started {
                    Ok(_) => spawned += 1,
                    Err(err) => {
                        error!("无法启动下载线程 {}: {}", wnum, err);
                        last_error = Some(err);
                    }
                }
            }
            if spawned == 0 {
                queue.close();
                return last_error;
            }

            for (idx, path) in results.iter().enumerate() {
                let rel = path.trim_start_matches('/').to_string();
                if queue.submit(rel).is_err() {
                    break;
                }
                if (idx + 1) % LOG_EVERY == 0 {
                    info!("已入队 {} 个下载路径", idx + 1);
                }
            }
            info!(
                "全部路径已入队，等待 {:?} 后关闭下载队列",
                self.opts.settle_delay
            );
            thread::sleep(self.opts.settle_delay);
            queue.close();
            None
        });
        progress.finish();

        if let Some(err) = spawn_error {
            return Err(DownloadError::Spawn(err));
        }

        let report = DownloadReport {
            downloaded: downloaded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        info!(
            "下载完成：成功 {}，失败 {}",
            report.downloaded, report.failed
        );
        Ok(report)
    }

    fn fetch_one(&self, rel: &str, target_dir: &Path) -> Result<u64, FileError> {
        let local = local_path(target_dir, rel)?;
        // 先请求，失败时不在目标目录留下空目录
        let mut body = self.client.open(rel)?;
        if let Some(parent) = local.parent() {
            // 多个线程可能同时创建同一个父目录，已存在不算错误
            fs::create_dir_all(parent).map_err(|source| FileError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = part_path(&local);
        let written = File::create(&tmp)
            .and_then(|mut file| io::copy(&mut body, &mut file))
            .map_err(|source| {
                let _ = fs::remove_file(&tmp);
                FileError::Io {
                    path: tmp.clone(),
                    source,
                }
            })?;

        // rename 直接覆盖已有文件
        fs::rename(&tmp, &local).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            FileError::Io {
                path: local.clone(),
                source,
            }
        })?;
        Ok(written)
    }
}

/// `target_dir` 下与远程路径对应的本地路径；含 `..`、根或盘符的路径被拒绝。
fn local_path(target_dir: &Path, rel: &str) -> Result<PathBuf, FileError> {
    let rel_path = Path::new(rel);
    let mut has_name = false;
    for component in rel_path.components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FileError::UnsafePath(rel.to_string()));
            }
        }
    }
    if !has_name {
        return Err(FileError::UnsafePath(rel.to_string()));
    }
    Ok(target_dir.join(rel_path))
}

fn part_path(local: &Path) -> PathBuf {
    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    local.with_file_name(format!("{name}.part"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStore;
    use std::time::Duration;

    fn fast_opts(workers: usize) -> DownloadOptions {
        DownloadOptions {
            workers,
            queue_capacity: 8,
            settle_delay: Duration::from_millis(10),
        }
    }

    fn results(paths: &[&str]) -> CrawlResultSet {
        CrawlResultSet::new(paths.iter().map(|p| p.to_string()).collect())
    }

    fn part_files(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(d) = stack.pop() {
            for entry in fs::read_dir(&d).unwrap() {
                let p = entry.unwrap().path();
                if p.is_dir() {
                    stack.push(p);
                } else if p.extension().is_some_and(|e| e == "part") {
                    found.push(p);
                }
            }
        }
        found
    }

    #[test]
    fn writes_example_files_under_target() {
        let out = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::example_tree());
        let downloader = BulkDownloader::new(store.clone(), fast_opts(4), &Span::none());

        let report = downloader
            .download(&results(&["/repoA/sub/x.txt", "/repoA/y.txt"]), out.path())
            .unwrap();

        assert_eq!(
            report,
            DownloadReport {
                downloaded: 2,
                failed: 0
            }
        );
        assert_eq!(
            fs::read(out.path().join("repoA/sub/x.txt")).unwrap(),
            b"content of x"
        );
        assert_eq!(
            fs::read(out.path().join("repoA/y.txt")).unwrap(),
            b"content of y"
        );
        // 前导 `/` 已去掉，不会出现双斜杠
        assert_eq!(store.request_count("repoA/y.txt"), 1);
        assert!(store.requests().iter().all(|r| !r.starts_with('/')));
    }

    #[test]
    fn many_files_with_shared_parents() {
        let out = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::synthetic_tree("lib", 2, 2, 5));

        let mut all = Vec::new();
        for a in ["", "/d0", "/d1", "/d0/d0", "/d0/d1", "/d1/d0", "/d1/d1"] {
            for i in 0..5 {
                all.push(format!("/lib{a}/f{i}.bin"));
            }
        }
        let set = CrawlResultSet::new(all.clone());
        let report = BulkDownloader::new(store, fast_opts(16), &Span::none())
            .download(&set, out.path())
            .unwrap();

        assert_eq!(report.downloaded, all.len());
        for p in &all {
            let rel = p.trim_start_matches('/');
            assert_eq!(fs::read(out.path().join(rel)).unwrap(), rel.as_bytes());
        }
    }

    #[test]
    fn second_run_overwrites_without_leftovers() {
        let out = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::example_tree());
        let downloader = BulkDownloader::new(store, fast_opts(2), &Span::none());
        let set = results(&["/repoA/sub/x.txt", "/repoA/y.txt"]);

        fs::create_dir_all(out.path().join("repoA")).unwrap();
        fs::write(out.path().join("repoA/y.txt"), b"stale and longer content").unwrap();

        downloader.download(&set, out.path()).unwrap();
        let second = downloader.download(&set, out.path()).unwrap();

        assert_eq!(second.downloaded, 2);
        assert_eq!(
            fs::read(out.path().join("repoA/y.txt")).unwrap(),
            b"content of y"
        );
        assert!(part_files(out.path()).is_empty());
    }

    #[test]
    fn failed_fetch_is_counted_and_skipped() {
        let out = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::example_tree().with_failure("repoA/y.txt"));
        let downloader = BulkDownloader::new(store, fast_opts(3), &Span::none());

        let report = downloader
            .download(
                &results(&["/repoA/sub/x.txt", "/repoA/y.txt", "/repoA/missing.bin"]),
                out.path(),
            )
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed, 2);
        assert!(!out.path().join("repoA/y.txt").exists());
        assert!(part_files(out.path()).is_empty());
    }

    #[test]
    fn failed_fetch_leaves_no_empty_directories() {
        let out = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::example_tree());
        let downloader = BulkDownloader::new(store, fast_opts(2), &Span::none());

        let report = downloader
            .download(&results(&["/gone/deep/a.bin", "/repoA/y.txt"]), out.path())
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.downloaded, 1);
        assert!(!out.path().join("gone").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn error_status_body_is_written_as_file() {
        use crate::base_system::credentials::{Credentials, StoreAccount};
        use crate::remote::HttpStoreClient;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repoA/missing.jar"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"errors\":[]}"))
            .mount(&server)
            .await;

        let out = tempfile::tempdir().unwrap();
        let target = out.path().to_path_buf();
        let uri = server.uri();
        let report = tokio::task::spawn_blocking(move || {
            let creds = Credentials {
                source: StoreAccount::default(),
                destination: StoreAccount {
                    url: uri,
                    user: "u".to_string(),
                    api_key: "k".to_string(),
                },
            };
            let client = HttpStoreClient::new(&creds.destination()).unwrap();
            BulkDownloader::new(Arc::new(client), fast_opts(1), &Span::none())
                .download(&results(&["/repoA/missing.jar"]), &target)
                .unwrap()
        })
        .await
        .unwrap();

        assert_eq!(
            report,
            DownloadReport {
                downloaded: 1,
                failed: 0
            }
        );
        assert_eq!(
            fs::read(out.path().join("repoA/missing.jar")).unwrap(),
            b"{\"errors\":[]}"
        );
    }

    #[test]
    fn traversal_paths_are_rejected() {
        let out = tempfile::tempdir().unwrap();
        let target = out.path().join("target");
        let store = Arc::new(FakeStore::new().with_file("repoA/../../escape.txt", b"nope"));
        let downloader = BulkDownloader::new(store.clone(), fast_opts(1), &Span::none());

        let report = downloader
            .download(&results(&["/repoA/../../escape.txt", "/"]), &target)
            .unwrap();

        assert_eq!(report.failed, 2);
        assert!(!out.path().join("escape.txt").exists());
        assert!(store.requests().is_empty());
    }

    #[test]
    fn unusable_target_dir_is_an_error() {
        let out = tempfile::tempdir().unwrap();
        let blocker = out.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let downloader =
            BulkDownloader::new(Arc::new(FakeStore::new()), fast_opts(1), &Span::none());
        let err = downloader
            .download(&results(&["/a"]), &blocker.join("below"))
            .unwrap_err();
        assert!(matches!(err, DownloadError::TargetDir { .. }));
    }

    #[test]
    fn local_path_rules() {
        let root = Path::new("/out");
        assert_eq!(
            local_path(root, "repo/a/b.jar").unwrap(),
            PathBuf::from("/out/repo/a/b.jar")
        );
        assert!(local_path(root, "repo/../../x").is_err());
        assert!(local_path(root, "").is_err());
        assert!(local_path(root, ".").is_err());
        assert_eq!(
            part_path(Path::new("/out/a/b.jar")),
            PathBuf::from("/out/a/b.jar.part")
        );
    }
}
