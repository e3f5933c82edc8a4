//! 社交画像抓取接口
//!
//! 第三方抓取服务只在接口边界消费：scrape(subject, max_items) 返回帖子列表；
//! subject 无数据时返回显式的空结果（不是错误），网络 / 服务故障才返回 Err。

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// 抓取到的单条帖子
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedPost {
    pub text: String,
}

/// 抓取服务接口
#[async_trait]
pub trait ScrapeProvider: Send + Sync {
    /// 抓取 subject 的公开帖子；无数据时返回 Ok(空列表)
    async fn scrape(&self, subject: &str, max_items: usize) -> Result<Vec<ScrapedPost>, String>;
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    posts: Vec<ScrapedPost>,
}

/// HTTP 抓取客户端：GET {base_url}/profiles/{subject}/posts?limit=N
pub struct HttpScrapeProvider {
    client: Client,
    base_url: String,
}

impl HttpScrapeProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("docent/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ScrapeProvider for HttpScrapeProvider {
    async fn scrape(&self, subject: &str, max_items: usize) -> Result<Vec<ScrapedPost>, String> {
        let url = format!("{}/profiles/{}/posts", self.base_url, subject);
        let resp = self
            .client
            .get(&url)
            .query(&[("limit", max_items.to_string())])
            .send()
            .await
            .map_err(|e| format!("Scrape request failed: {}", e))?;

        // 404 表示 subject 不存在：显式空结果，不是故障
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(format!("Scrape service returned HTTP {}", resp.status()));
        }

        let body: ScrapeResponse = resp
            .json()
            .await
            .map_err(|e| format!("Scrape response body: {}", e))?;

        if body.status.as_deref() == Some("no_results") {
            return Ok(Vec::new());
        }
        Ok(body.posts)
    }
}

/// Mock 抓取服务：按 subject 预置帖子；可注入前 N 次调用失败以测试重试
pub struct MockScrapeProvider {
    posts: HashMap<String, Vec<ScrapedPost>>,
    failures_before_success: std::sync::atomic::AtomicU32,
}

impl MockScrapeProvider {
    pub fn new() -> Self {
        Self {
            posts: HashMap::new(),
            failures_before_success: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn with_posts(mut self, subject: &str, texts: Vec<&str>) -> Self {
        self.posts.insert(
            subject.to_string(),
            texts
                .into_iter()
                .map(|t| ScrapedPost {
                    text: t.to_string(),
                })
                .collect(),
        );
        self
    }

    /// 前 n 次 scrape 调用返回瞬时错误
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_before_success
            .store(n, std::sync::atomic::Ordering::SeqCst);
        self
    }
}

impl Default for MockScrapeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScrapeProvider for MockScrapeProvider {
    async fn scrape(&self, subject: &str, max_items: usize) -> Result<Vec<ScrapedPost>, String> {
        use std::sync::atomic::Ordering;
        let remaining = self.failures_before_success.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_before_success.store(remaining - 1, Ordering::SeqCst);
            return Err("transient scrape failure".to_string());
        }
        Ok(self
            .posts
            .get(subject)
            .map(|posts| posts.iter().take(max_items).cloned().collect())
            .unwrap_or_default())
    }
}
