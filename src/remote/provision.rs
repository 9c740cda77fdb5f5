//! 仓库定义的查询、删除与重建。
//!
//! 只做通用的远程仓库重建：仓库类型、上游地址、布局沿用源库定义，不按包类型做特殊处理。

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{error, info, warn};

use super::client::{FetchError, HttpStoreClient};
use super::models::{RemoteRepoDefinition, RepoInfo, StorageInfo, VersionInfo};
use crate::base_system::context::ProvisioningConfig;

const REPOSITORIES_API: &str = "api/repositories";

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub delete_retry: Duration,
    pub delete_max_attempts: u32,
    pub post_delete_pause: Duration,
    pub assumed_offline_period_secs: u64,
}

impl From<&ProvisioningConfig> for ProvisionOptions {
    fn from(cfg: &ProvisioningConfig) -> Self {
        Self {
            delete_retry: Duration::from_secs(cfg.delete_retry_secs),
            delete_max_attempts: cfg.delete_max_attempts.max(1),
            post_delete_pause: Duration::from_secs(cfg.post_delete_pause_secs),
            assumed_offline_period_secs: cfg.assumed_offline_period_secs,
        }
    }
}

pub fn store_version(client: &HttpStoreClient) -> Result<VersionInfo, FetchError> {
    client.get_json("api/system/version")
}

/// 逐个拉取仓库定义；拉取或解码失败的仓库记录日志后跳过。
pub fn fetch_repo_infos(client: &HttpStoreClient, keys: &[String]) -> Vec<RepoInfo> {
    let mut infos = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        match client.get_json::<RepoInfo>(&format!("{REPOSITORIES_API}/{key}")) {
            Ok(info) => infos.push(info),
            Err(err) => error!("获取仓库 {} 的定义失败: {}", key, err),
        }
    }
    infos
}

/// 从 `api/storageinfo` 挑出占用超过 1GB 的缓存仓库，按体积降序返回（去掉 `-cache` 后缀）。
pub fn discover_cached_remote_repos(client: &HttpStoreClient) -> Result<Vec<String>> {
    let storage: StorageInfo = client
        .get_json("api/storageinfo")
        .context("获取 api/storageinfo 失败")?;
    if let Some(fs) = &storage.file_store {
        info!(
            "源库存储 {}：已用 {} / 共 {}",
            fs.storage_type, fs.used_space, fs.total_space
        );
    }
    Ok(pick_cached_remote_repos(&storage))
}

pub(crate) fn pick_cached_remote_repos(storage: &StorageInfo) -> Vec<String> {
    let mut sized: Vec<(String, f64)> = storage
        .repositories
        .iter()
        .filter(|r| r.repo_type == "CACHE")
        .filter_map(|r| {
            let gb = parse_gb(&r.used_space);
            if gb.is_none() {
                // 不足 1GB 的仓库以 MB/KB 显示，直接略过
                tracing::debug!(
                    "跳过仓库 {}（{} 个文件，占用 {}）",
                    r.repo_key,
                    r.files_count,
                    r.used_space
                );
            }
            gb.map(|gb| (r.repo_key.clone(), gb))
        })
        .collect();

    sized.sort_by(|a, b| b.1.total_cmp(&a.1));
    sized
        .into_iter()
        .map(|(key, _)| key.replace("-cache", ""))
        .collect()
}

static RE_GB: OnceLock<Regex> = OnceLock::new();

fn re_gb() -> &'static Regex {
    RE_GB.get_or_init(|| Regex::new(r"(-?\d[\d,]*(?:\.\d+)?)\s*GB").expect("compile RE_GB"))
}

fn parse_gb(used_space: &str) -> Option<f64> {
    let caps = re_gb().captures(used_space)?;
    caps[1].replace(',', "").parse::<f64>().ok()
}

/// 目标库上的仓库管理。
pub struct RepoAdmin<'a> {
    client: &'a HttpStoreClient,
    opts: ProvisionOptions,
}

impl<'a> RepoAdmin<'a> {
    pub fn new(client: &'a HttpStoreClient, opts: ProvisionOptions) -> Self {
        Self { client, opts }
    }

    pub fn find(&self, key: &str) -> Option<RepoInfo> {
        match self
            .client
            .get_json::<RepoInfo>(&format!("{REPOSITORIES_API}/{key}"))
        {
            Ok(info) if info.key == key => Some(info),
            Ok(_) => None,
            Err(FetchError::Status { status: 400 | 404, .. }) => None,
            Err(err) => {
                warn!("查询仓库 {} 失败: {}", key, err);
                None
            }
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    pub fn delete_with_retry(&self, key: &str) -> Result<()> {
        let attempts = self.opts.delete_max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.client.delete(&format!("{REPOSITORIES_API}/{key}")) {
                Ok(()) => {
                    info!("已删除仓库 {}，等待 {:?}", key, self.opts.post_delete_pause);
                    thread::sleep(self.opts.post_delete_pause);
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "删除仓库 {} 失败（第 {}/{} 次）: {}",
                        key, attempt, attempts, err
                    );
                    if attempt < attempts {
                        thread::sleep(self.opts.delete_retry);
                    }
                }
            }
        }
        Err(anyhow!("删除仓库 {} 重试耗尽", key))
    }

    pub fn create_remote(&self, source: &RepoInfo) -> Result<()> {
        let definition = RemoteRepoDefinition {
            key: source.key.clone(),
            rclass: "remote",
            package_type: source.package_type.clone(),
            url: source.url.clone(),
            repo_layout_ref: source.repo_layout_ref.clone(),
            description: format!("A caching proxy repository for {}", source.key),
            xray_index: true,
            assumed_offline_period_secs: self.opts.assumed_offline_period_secs,
        };
        self.client
            .put_json(&format!("{REPOSITORIES_API}/{}", source.key), &definition)
            .with_context(|| format!("创建远程仓库 {} 失败", source.key))
    }

    /// 目标库已有同名仓库时先删除，再按源库定义新建。
    pub fn recreate(&self, source: &RepoInfo) -> Result<()> {
        if self.exists(&source.key) {
            info!("目标库已存在仓库 {}，先删除", source.key);
            self.delete_with_retry(&source.key)?;
        }
        self.create_remote(source)?;
        match self.find(&source.key) {
            Some(info) => info!("重建后的仓库定义: {:?}", info),
            None => warn!("仓库 {} 已提交创建，但暂时查询不到", source.key),
        }
        Ok(())
    }
}
