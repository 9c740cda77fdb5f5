//! 数据库连接压测：多线程随机发送 AQL 查询。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use rand::Rng;
use tracing::{Span, debug, error, info, info_span};

use super::client::HttpStoreClient;

pub const AQL_API: &str = "api/search/aql";

pub const QUERIES: &[&str] = &[
    r#"items.find({"name" : {"$match":"*.jar"}}).sort({"$asc" : ["repo","name"]})"#,
    r#"items.find({"modified" : {"$last" : "3d"}})"#,
    r#"items.find().include("*")"#,
    r#"items.find({"size" : {"$gt":"5000"},"name":{"$match":"*.jar"},"$or":[{"repo" : "jfrog-libs-cache", "repo" : "ubuntu-cache" }]})"#,
    r#"items.find({"name" : {"$match":"*.jar"}}).sort({"$desc" : ["repo","name"]})"#,
    r#"items.find({"size" : {"$lt":"10000"},"name":{"$match":"*.jar"},"$or":[{"repo" : "jfrog-libs-cache", "repo" : "ubuntu-cache" }]})"#,
    r#"items.find({"name" : {"$match":"*.pom"}}).sort({"$desc" : ["repo","name"]})"#,
    r#"items.find({"size" : {"$lt":"10000"},"name":{"$match":"*.pom"},"$or":[{"repo" : "jfrog-libs-cache", "repo" : "ubuntu-cache" }]})"#,
    r#"items.find({"name" : {"$match":"*.xml"}}).sort({"$desc" : ["repo","name"]})"#,
    r#"items.find({"size" : {"$gt":"100"},"name":{"$match":"*.xml"},"$or":[{"repo" : "jfrog-libs-cache", "repo" : "ubuntu-cache" }]})"#,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AqlReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct AqlLoad {
    client: HttpStoreClient,
    span: Span,
}

impl AqlLoad {
    pub fn new(client: HttpStoreClient, parent: &Span) -> Self {
        Self {
            client,
            span: info_span!(parent: parent, "aql_load"),
        }
    }

    /// `workers` 个线程各执行 `iterations` 次随机查询，全部结束后返回。
    pub fn run(&self, workers: usize, iterations: usize) -> AqlReport {
        let _enter = self.span.enter();
        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        info!("启动 {} 个 AQL 线程，每个 {} 次查询", workers, iterations);
        thread::scope(|s| {
            for wnum in 0..workers {
                let (succeeded, failed) = (&succeeded, &failed);
                let client = &self.client;
                let span = info_span!(parent: &self.span, "aql_worker", wnum);
                let spawned = thread::Builder::new()
                    .name(format!("aql-{wnum}"))
                    .spawn_scoped(s, move || {
                        let _enter = span.enter();
                        let mut rng = rand::rng();
                        for _ in 0..iterations {
                            let query = QUERIES[rng.random_range(0..QUERIES.len())];
                            match client.post_text(AQL_API, query) {
                                Ok(body) => {
                                    debug!("AQL = {}，响应 {} 字节", query, body.len());
                                    succeeded.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(err) => {
                                    error!("AQL 执行失败 {}: {}", query, err);
                                    failed.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                        info!("AQL 线程 {} 完成", wnum);
                    });
                if let Err(err) = spawned {
                    error!("无法启动 AQL 线程 {}: {}", wnum, err);
                }
            }
        });

        let report = AqlReport {
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        info!(
            "AQL 压测结束：成功 {}，失败 {}",
            report.succeeded, report.failed
        );
        report
    }
}
