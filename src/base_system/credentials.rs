//! 源/目标制品库的访问凭据（`credentials.yml`）。

use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

/// 访问某个制品库所需的最小能力集合。
pub trait StoreCredentials {
    /// 日志里用来区分源/目标库的标签。
    const ROLE: &'static str;

    fn url(&self) -> &str;
    fn user(&self) -> &str;
    fn secret(&self) -> &str;
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreAccount {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub api_key: String,
}

impl fmt::Debug for StoreAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = if self.api_key.is_empty() { "" } else { "***" };
        f.debug_struct("StoreAccount")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("api_key", &masked)
            .finish()
    }
}

/// 被抓取的参考库（只读）。
#[derive(Debug, Clone)]
pub struct SourceStore(StoreAccount);

/// 被施压的目标库：仓库在这里重建，文件从这里下载。
#[derive(Debug, Clone)]
pub struct DestinationStore(StoreAccount);

impl StoreCredentials for SourceStore {
    const ROLE: &'static str = "source";

    fn url(&self) -> &str {
        &self.0.url
    }

    fn user(&self) -> &str {
        &self.0.user
    }

    fn secret(&self) -> &str {
        &self.0.api_key
    }
}

impl StoreCredentials for DestinationStore {
    const ROLE: &'static str = "destination";

    fn url(&self) -> &str {
        &self.0.url
    }

    fn user(&self) -> &str {
        &self.0.user
    }

    fn secret(&self) -> &str {
        &self.0.api_key
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub source: StoreAccount,
    #[serde(default)]
    pub destination: StoreAccount,
}

impl Credentials {
    pub fn source(&self) -> SourceStore {
        SourceStore(self.source.clone())
    }

    pub fn destination(&self) -> DestinationStore {
        DestinationStore(self.destination.clone())
    }
}

impl ConfigSpec for Credentials {
    const FILE_NAME: &'static str = "credentials.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 2] = [
            FieldMeta {
                name: "source",
                description: "参考库（抓取目录树）：url / user / api_key",
            },
            FieldMeta {
                name: "destination",
                description: "目标库（重建仓库并下载文件）：url / user / api_key",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (role, account) in [("source", &self.source), ("destination", &self.destination)] {
            let url = account.url.trim();
            if url.is_empty() {
                continue;
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "{role}.url 必须以 http:// 或 https:// 开头: {url}"
                )));
            }
        }
        Ok(())
    }
}
