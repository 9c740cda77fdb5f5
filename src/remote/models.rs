//! 制品库 REST 接口的 JSON 结构。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `api/storage/<path>` 的目录列表。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderListing {
    #[serde(default)]
    pub children: Vec<ChildEntry>,
    /// 服务端出错时返回 `{"errors": [...]}`，同样能被解码成功。
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// 目录下的一个子项；`uri` 相对于被查询的目录，形如 `/name`。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChildEntry {
    pub uri: String,
    #[serde(default)]
    pub folder: bool,
}

/// `api/repositories/<key>` 返回的仓库定义（只取用得到的字段）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub key: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "rclass")]
    pub repo_type: String,
    #[serde(default, rename = "packageType")]
    pub package_type: String,
    #[serde(default, rename = "repoLayoutRef")]
    pub repo_layout_ref: String,
}

/// 新建远程仓库时提交的定义。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepoDefinition {
    pub key: String,
    pub rclass: &'static str,
    pub package_type: String,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo_layout_ref: String,
    pub description: String,
    pub xray_index: bool,
    pub assumed_offline_period_secs: u64,
}

/// `api/storageinfo` 中用得到的部分。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageInfo {
    #[serde(default, rename = "fileStoreSummary")]
    pub file_store: Option<FileStoreSummary>,
    #[serde(default, rename = "repositoriesSummaryList")]
    pub repositories: Vec<RepoStorageSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStoreSummary {
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub used_space: String,
    #[serde(default)]
    pub total_space: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStorageSummary {
    pub repo_key: String,
    #[serde(default)]
    pub repo_type: String,
    #[serde(default)]
    pub files_count: u64,
    #[serde(default)]
    pub used_space: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub revision: String,
}
