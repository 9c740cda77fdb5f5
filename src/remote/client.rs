//! 制品库 HTTP 客户端。
//!
//! 约定：读取类调用（`get_bytes` / `open`）不区分 2xx 与非 2xx，状态码只记日志，
//! 响应体照常返回；调用方以 JSON 解码是否成功作为最终判断依据。

use std::io::{self, Read};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::base_system::credentials::StoreCredentials;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("building http client failed: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("reading body of {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url}: {source}")]
    Io {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("decoding response of {url} failed: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 抓取器与下载器共用的最小读取接口。
pub trait StoreClient: Send + Sync {
    /// 对 `uri`（相对库根地址）发起一次 GET，返回完整响应体。
    fn get_bytes(&self, uri: &str) -> Result<Vec<u8>, FetchError>;

    /// 对 `uri` 发起一次 GET，返回可流式读取的响应体。
    fn open(&self, uri: &str) -> Result<Box<dyn Read + Send>, FetchError>;
}

/// 基于 `reqwest::blocking` 的实现，使用 HTTP Basic 认证（用户名 + API Key）。
#[derive(Clone)]
pub struct HttpStoreClient {
    client: Client,
    base: String,
    user: String,
    secret: String,
    role: &'static str,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

impl HttpStoreClient {
    /// 请求总时长不设上限：大文件的流式下载可能持续很久。
    pub fn new<C: StoreCredentials>(creds: &C) -> Result<Self, FetchError> {
        Self::build(creds, None)
    }

    fn build<C: StoreCredentials>(
        creds: &C,
        request_timeout: Option<Duration>,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        // 构建时未启用 gzip 解码，要求服务端返回原始字节
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            // blocking 客户端默认 30 秒总超时，这里显式覆盖
            .timeout(request_timeout)
            .build()
            .map_err(FetchError::Build)?;

        Ok(Self {
            client,
            base: normalize_base(creds.url()),
            user: creds.user().to_string(),
            secret: creds.secret().to_string(),
            role: C::ROLE,
        })
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    /// `<base>/<uri>`，两者之间恰好一个 `/`。
    pub fn endpoint(&self, uri: &str) -> String {
        join_url(&self.base, uri)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.user, Some(&self.secret))
    }

    fn send_get(&self, uri: &str) -> Result<(String, Response), FetchError> {
        let url = self.endpoint(uri);
        debug!(store = self.role, "GET {}", url);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            warn!(store = self.role, "GET {} 返回 HTTP {}", url, status.as_u16());
        }
        Ok((url, resp))
    }

    /// GET 并解码 JSON；非 2xx 视为失败。管理类接口使用。
    pub fn get_json<T: DeserializeOwned>(&self, uri: &str) -> Result<T, FetchError> {
        let (url, resp) = self.send_get(uri)?;
        let resp = ensure_success(&url, resp)?;
        let body = resp.bytes().map_err(|source| FetchError::Body {
            url: url.clone(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }

    pub fn put_json<B: Serialize + ?Sized>(&self, uri: &str, body: &B) -> Result<(), FetchError> {
        let url = self.endpoint(uri);
        debug!(store = self.role, "PUT {}", url);
        let resp = self
            .authed(self.client.put(&url))
            .json(body)
            .send()
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        ensure_success(&url, resp).map(|_| ())
    }

    pub fn delete(&self, uri: &str) -> Result<(), FetchError> {
        let url = self.endpoint(uri);
        debug!(store = self.role, "DELETE {}", url);
        let resp = self
            .authed(self.client.delete(&url))
            .send()
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        ensure_success(&url, resp).map(|_| ())
    }

    /// POST 纯文本请求体（AQL），返回响应体。
    pub fn post_text(&self, uri: &str, text: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.endpoint(uri);
        debug!(store = self.role, "POST {}", url);
        let resp = self
            .authed(self.client.post(&url))
            .header(CONTENT_TYPE, "text/plain")
            .body(text.to_string())
            .send()
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        let resp = ensure_success(&url, resp)?;
        let body = resp
            .bytes()
            .map_err(|source| FetchError::Body { url, source })?;
        Ok(body.to_vec())
    }
}

impl StoreClient for HttpStoreClient {
    fn get_bytes(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        let (url, resp) = self.send_get(uri)?;
        let body = resp
            .bytes()
            .map_err(|source| FetchError::Body { url, source })?;
        Ok(body.to_vec())
    }

    fn open(&self, uri: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        let (_, resp) = self.send_get(uri)?;
        Ok(Box::new(resp))
    }
}

fn ensure_success(url: &str, resp: Response) -> Result<Response, FetchError> {
    let status = resp.status();
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        Ok(resp)
    } else {
        Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

pub(crate) fn join_url(base: &str, uri: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), uri.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::credentials::{Credentials, StoreAccount};
    use wiremock::matchers::{basic_auth, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // blocking 客户端的创建与销毁都放在 spawn_blocking 线程里，避免在异步上下文中阻塞
    fn client_for(server_uri: &str) -> HttpStoreClient {
        client_with_timeout(server_uri, None)
    }

    fn client_with_timeout(server_uri: &str, timeout: Option<Duration>) -> HttpStoreClient {
        let creds = Credentials {
            source: StoreAccount {
                url: format!("{server_uri}/artifactory/"),
                user: "loader".to_string(),
                api_key: "key-123".to_string(),
            },
            destination: StoreAccount::default(),
        };
        HttpStoreClient::build(&creds.source(), timeout).unwrap()
    }

    #[test]
    fn join_url_keeps_exactly_one_separator() {
        assert_eq!(join_url("http://h/a/", "/x/y"), "http://h/a/x/y");
        assert_eq!(join_url("http://h/a", "x/y"), "http://h/a/x/y");
        assert_eq!(normalize_base(" http://h/a// "), "http://h/a");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_bytes_sends_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifactory/api/storage/repoA"))
            .and(basic_auth("loader", "key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"children\":[]}"))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let body = tokio::task::spawn_blocking(move || {
            client_for(&uri).get_bytes("api/storage/repoA")
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(body, b"{\"children\":[]}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_success_status_still_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifactory/api/storage/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"errors\":[]}"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let body = tokio::task::spawn_blocking(move || {
            client_for(&uri).get_bytes("api/storage/missing")
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(body, b"{\"errors\":[]}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_streams_file_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifactory/repoA/sub/x.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let uri = server.uri();
        let content = tokio::task::spawn_blocking(move || {
            let client = client_for(&uri);
            let mut reader = client.open("repoA/sub/x.txt").unwrap();
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).unwrap();
            buf
        })
        .await
        .unwrap();
        assert_eq!(content, b"payload");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_transfer_outlives_blocking_default_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifactory/big.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"layer".to_vec())
                    .set_delay(Duration::from_secs(32)),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let content = tokio::task::spawn_blocking(move || {
            let client = client_for(&uri);
            let mut reader = client.open("big.bin").unwrap();
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).unwrap();
            buf
        })
        .await
        .unwrap();
        assert_eq!(content, b"layer");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn explicit_timeout_still_applies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifactory/slow.bin"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            client_with_timeout(&uri, Some(Duration::from_millis(200)))
                .open("slow.bin")
                .map(|_| ())
        })
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn post_text_uses_plain_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/artifactory/api/search/aql"))
            .and(header("content-type", "text/plain"))
            .and(body_string("items.find()"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"results\":[]}"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let body = tokio::task::spawn_blocking(move || {
            client_for(&uri).post_text("api/search/aql", "items.find()")
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(body, b"{\"results\":[]}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_reports_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/artifactory/api/repositories/busy"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            client_for(&uri).delete("api/repositories/busy")
        })
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 409, .. }));
    }
}
