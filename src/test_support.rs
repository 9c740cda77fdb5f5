//! 内存版制品库，供抓取/下载相关测试使用。

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde_json::json;

use crate::crawl::models::listing_uri;
use crate::remote::{FetchError, StoreClient};

#[derive(Default)]
pub struct FakeStore {
    bodies: HashMap<String, Vec<u8>>,
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

fn key(uri: &str) -> String {
    uri.trim_start_matches('/').to_string()
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, uri: &str, body: &[u8]) -> Self {
        self.bodies.insert(key(uri), body.to_vec());
        self
    }

    /// 注册 `path` 的目录列表；`children` 为 (名称, 是否目录)。
    pub fn with_folder(mut self, path: &str, children: &[(&str, bool)]) -> Self {
        let children: Vec<_> = children
            .iter()
            .map(|(name, folder)| json!({"uri": format!("/{name}"), "folder": folder}))
            .collect();
        let body = json!({"repo": path.trim_matches('/'), "path": "/", "children": children});
        self.bodies
            .insert(key(&listing_uri(path)), body.to_string().into_bytes());
        self
    }

    pub fn with_delay(mut self, uri: &str, delay: Duration) -> Self {
        self.delays.insert(key(uri), delay);
        self
    }

    pub fn with_failure(mut self, uri: &str) -> Self {
        self.failures.insert(key(uri));
        self
    }

    /// `repoA/{sub/x.txt, y.txt}`，两个文件都带内容。
    pub fn example_tree() -> Self {
        Self::new()
            .with_folder("repoA", &[("sub", true), ("y.txt", false)])
            .with_folder("repoA/sub", &[("x.txt", false)])
            .with_file("repoA/sub/x.txt", b"content of x")
            .with_file("repoA/y.txt", b"content of y")
    }

    /// 每层 `fanout` 个子目录，共 `depth` 层；每个目录含 `files` 个文件。
    pub fn synthetic_tree(root: &str, fanout: usize, depth: usize, files: usize) -> Self {
        let mut store = Self::new();
        let mut level = vec![root.to_string()];
        for d in 0..=depth {
            let mut next = Vec::new();
            for folder in &level {
                let mut children: Vec<(String, bool)> = (0..files)
                    .map(|i| (format!("f{i}.bin"), false))
                    .collect();
                if d < depth {
                    for i in 0..fanout {
                        children.push((format!("d{i}"), true));
                        next.push(format!("{folder}/d{i}"));
                    }
                }
                for (name, is_folder) in &children {
                    if !is_folder {
                        let file = format!("{folder}/{name}");
                        store = store.with_file(&file, file.as_bytes());
                    }
                }
                let borrowed: Vec<(&str, bool)> =
                    children.iter().map(|(n, f)| (n.as_str(), *f)).collect();
                store = store.with_folder(folder, &borrowed);
            }
            level = next;
        }
        store
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self, uri: &str) -> usize {
        let wanted = key(uri);
        self.requests().iter().filter(|r| **r == wanted).count()
    }
}

impl StoreClient for FakeStore {
    fn get_bytes(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        let k = key(uri);
        if let Ok(mut log) = self.requests.lock() {
            log.push(k.clone());
        }
        if let Some(delay) = self.delays.get(&k) {
            thread::sleep(*delay);
        }
        if self.failures.contains(&k) {
            return Err(FetchError::Io {
                url: k,
                source: io::Error::new(io::ErrorKind::ConnectionReset, "injected failure"),
            });
        }
        self.bodies.get(&k).cloned().ok_or_else(|| FetchError::Io {
            url: k,
            source: io::Error::new(io::ErrorKind::NotFound, "no such path"),
        })
    }

    fn open(&self, uri: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        let body = self.get_bytes(uri)?;
        Ok(Box::new(Cursor::new(body)))
    }
}
