//! 模拟流程编排：远程 HTTP 连接（抓取 + 下载）与数据库连接（AQL）两类负载。

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{Span, error, info, info_span, warn};

use crate::base_system::context::SimConfig;
use crate::base_system::credentials::Credentials;
use crate::crawl::TreeCrawler;
use crate::download::{BulkDownloader, DownloadReport};
use crate::remote::HttpStoreClient;
use crate::remote::aql::{AqlLoad, AqlReport};
use crate::remote::metrics::MetricsPoller;
use crate::remote::provision::{self, ProvisionOptions, RepoAdmin};

/// 一轮远程 HTTP 模拟的结果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub repos: Vec<String>,
    pub files_found: usize,
    pub download: DownloadReport,
}

pub struct Simulator {
    config: SimConfig,
    source: Arc<HttpStoreClient>,
    destination: Arc<HttpStoreClient>,
    span: Span,
}

impl Simulator {
    pub fn new(config: SimConfig, creds: &Credentials, parent: &Span) -> Result<Self> {
        let source = HttpStoreClient::new(&creds.source()).context("创建源库客户端失败")?;
        let destination =
            HttpStoreClient::new(&creds.destination()).context("创建目标库客户端失败")?;
        Ok(Self::with_clients(config, source, destination, parent))
    }

    pub fn with_clients(
        config: SimConfig,
        source: HttpStoreClient,
        destination: HttpStoreClient,
        parent: &Span,
    ) -> Self {
        Self {
            config,
            source: Arc::new(source),
            destination: Arc::new(destination),
            span: info_span!(parent: parent, "simulator"),
        }
    }

    /// 记录两个库的版本；查询失败只告警。
    pub fn log_store_versions(&self) {
        let _enter = self.span.enter();
        for client in [&self.source, &self.destination] {
            match provision::store_version(client) {
                Ok(v) => info!(
                    "{} 库版本 {}（revision {}）",
                    client.role(),
                    v.version,
                    v.revision
                ),
                Err(err) => warn!("获取 {} 库版本失败: {}", client.role(), err),
            }
        }
    }

    /// 依次执行两类模拟；指标轮询（若启用）覆盖整个过程。
    pub fn run(&self) -> Result<()> {
        let _enter = self.span.enter();
        let mut poller = if self.config.metric_poll.enabled {
            let interval = Duration::from_secs(self.config.metric_poll.interval_secs.max(1));
            Some(
                MetricsPoller::spawn(self.destination.clone(), interval, &self.span)
                    .context("启动指标轮询线程失败")?,
            )
        } else {
            None
        };

        let http = self.sim_remote_http_conns();
        let db = self.sim_db_conns();

        if let Some(p) = poller.as_mut() {
            p.stop();
        }
        http?;
        db?;
        info!("模拟结束");
        Ok(())
    }

    pub fn sim_remote_http_conns(&self) -> Result<Vec<RoundSummary>> {
        let _enter = self.span.enter();
        let repos = self.resolve_repos()?;
        if repos.is_empty() {
            info!("未配置远程仓库，跳过远程 HTTP 连接模拟");
            return Ok(Vec::new());
        }
        info!("待模拟的远程仓库: {:?}", repos);

        let cfg = &self.config.remote_http_conn;
        let rounds = if cfg.repeat {
            cfg.repeat_count.max(1)
        } else {
            1
        };
        let mut summaries = Vec::with_capacity(rounds as usize);
        for round in 1..=rounds {
            info!("远程 HTTP 模拟第 {}/{} 轮", round, rounds);
            summaries.push(self.remote_http_round(&repos)?);
            if round < rounds {
                let pause = Duration::from_secs(cfg.repeat_freq_secs);
                info!("等待 {:?} 后开始下一轮", pause);
                thread::sleep(pause);
            }
        }
        Ok(summaries)
    }

    fn resolve_repos(&self) -> Result<Vec<String>> {
        let cfg = &self.config.remote_http_conn;
        let configured: Vec<String> = cfg
            .remote_repos
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if !configured.is_empty() || !cfg.auto_discover {
            return Ok(configured);
        }
        let discovered = provision::discover_cached_remote_repos(&self.source)?;
        info!("源库中超过 1GB 的缓存仓库 {} 个", discovered.len());
        Ok(discovered)
    }

    fn remote_http_round(&self, repos: &[String]) -> Result<RoundSummary> {
        let infos = provision::fetch_repo_infos(&self.source, repos);
        if infos.is_empty() {
            warn!("没有取到任何仓库定义，本轮跳过");
            return Ok(RoundSummary::default());
        }

        if self.config.remote_http_conn.recreate_repos {
            let admin = RepoAdmin::new(
                &self.destination,
                ProvisionOptions::from(&self.config.provisioning),
            );
            for info in &infos {
                info!("在目标库重建仓库 {}", info.key);
                if let Err(err) = admin.recreate(info) {
                    error!("重建仓库 {} 失败: {:#}", info.key, err);
                }
            }
        }

        let roots: Vec<String> = infos.iter().map(|i| i.key.clone()).collect();
        let crawler = TreeCrawler::new(
            self.source.clone(),
            self.config.crawl_options(),
            &self.span,
        );
        let results = crawler.crawl(&roots);
        info!("共发现 {} 个制品", results.len());

        let downloader = BulkDownloader::new(
            self.destination.clone(),
            self.config.download_options(),
            &self.span,
        );
        let target = self.config.target_dir();
        let download = downloader
            .download(&results, &target)
            .with_context(|| format!("下载到 {} 失败", target.display()))?;

        Ok(RoundSummary {
            repos: roots,
            files_found: results.len(),
            download,
        })
    }

    pub fn sim_db_conns(&self) -> Result<Option<AqlReport>> {
        let _enter = self.span.enter();
        let cfg = &self.config.db_conn;
        if !cfg.enabled {
            info!("数据库连接模拟未启用");
            return Ok(None);
        }
        let load = AqlLoad::new((*self.destination).clone(), &self.span);
        Ok(Some(load.run(cfg.num_workers, cfg.num_iters_by_worker)))
    }
}
