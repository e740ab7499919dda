//! 网络获取能力。
//!
//! 流水线只依赖 `Fetcher` trait；`HttpFetcher` 为基于 reqwest 的阻塞实现，
//! 负责旧编码（GBK 等）解码与退避重试。

use std::fmt;

use encoding_rs::Encoding;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT,
};
use tracing::{debug, warn};

use crate::base_system::context::Config;
use crate::base_system::error::{BookError, BookResult};
use crate::base_system::retry::{RetryPolicy, with_backoff};

#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    /// 去掉参数后的小写 MIME，例如 `image/jpeg`
    pub content_type: Option<String>,
}

pub trait Fetcher: Sync {
    /// 获取页面并按 `encoding` 标签（如 `gbk`）解码为文本。
    fn fetch_text(&self, url: &str, encoding: &str) -> BookResult<String>;

    fn fetch_bytes(&self, url: &str) -> BookResult<Fetched>;

    /// 只探测资源的 Content-Type，不下载正文。
    fn probe_content_type(&self, url: &str) -> BookResult<Option<String>>;
}

/// 按标签解码；BOM 优先于标签。
pub fn decode_with_label(bytes: &[u8], label: &str) -> BookResult<String> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| BookError::Validation(format!("未知的页面编码: {label}")))?;
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(target: "network", encoding = used.name(), "页面包含无法解码的字节，已替换");
    }
    Ok(text.into_owned())
}

/// `text/html; charset=gbk` -> `text/html`
pub fn mime_essence(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[derive(Debug)]
struct AttemptError {
    message: String,
    retryable: bool,
}

impl AttemptError {
    fn transient(err: impl fmt::Display) -> Self {
        Self {
            message: err.to_string(),
            retryable: true,
        }
    }

    fn status(status: StatusCode) -> Self {
        Self {
            message: format!("HTTP {status}"),
            retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub struct HttpFetcher {
    client: Client,
    user_agent: String,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        // reqwest 未启用 gzip 解码，要求 identity 编码
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        default_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(cfg.request_timeout())
            .build()?;

        Ok(Self {
            client,
            user_agent: cfg.user_agent.clone(),
            retry: RetryPolicy::from_millis(cfg.max_retries, cfg.min_wait_time, cfg.max_wait_time),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,image/*;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        headers
    }

    fn get_once(&self, url: &Url) -> Result<Fetched, AttemptError> {
        let resp = self
            .client
            .get(url.clone())
            .headers(self.headers())
            .send()
            .map_err(AttemptError::transient)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AttemptError::status(status));
        }
        let content_type = content_type_of(resp.headers());
        let bytes = resp.bytes().map_err(AttemptError::transient)?;
        Ok(Fetched {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    fn head_once(&self, url: &Url) -> Result<Option<String>, AttemptError> {
        let resp = self
            .client
            .head(url.clone())
            .headers(self.headers())
            .send()
            .map_err(AttemptError::transient)?;
        let status = resp.status();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            // 部分图床不支持 HEAD，退回 GET 读取响应头
            return self.get_once(url).map(|f| f.content_type);
        }
        if !status.is_success() {
            return Err(AttemptError::status(status));
        }
        Ok(content_type_of(resp.headers()))
    }

    fn with_retry<T>(
        &self,
        url: &str,
        op: impl Fn(&Url) -> Result<T, AttemptError>,
    ) -> BookResult<T> {
        let parsed = Url::parse(url).map_err(|e| BookError::fetch(url, e))?;
        debug!(target: "network", %url, "request");
        with_backoff(&self.retry, || op(&parsed), |e| e.retryable)
            .map_err(|e| BookError::fetch(url, e))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_text(&self, url: &str, encoding: &str) -> BookResult<String> {
        let fetched = self.with_retry(url, |u| self.get_once(u))?;
        decode_with_label(&fetched.bytes, encoding)
    }

    fn fetch_bytes(&self, url: &str) -> BookResult<Fetched> {
        self.with_retry(url, |u| self.get_once(u))
    }

    fn probe_content_type(&self, url: &str) -> BookResult<Option<String>> {
        self.with_retry(url, |u| self.head_once(u))
    }
}

fn content_type_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(mime_essence)
        .filter(|s| !s.is_empty())
}
