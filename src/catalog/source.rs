//! 议程数据源
//!
//! FeedSource 通过 HTTP 拉取 JSON 数组；StaticSource 持有固定条目（示例数据与测试）。

use async_trait::async_trait;
use reqwest::Client;

use super::item::SessionItem;

/// 数据源接口：一次性返回整份议程
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<SessionItem>, String>;
}

/// HTTP 数据源：GET feed_url，期望返回 SessionItem 的 JSON 数组
pub struct FeedSource {
    client: Client,
    url: String,
}

impl FeedSource {
    pub fn new(url: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("docent/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl CatalogSource for FeedSource {
    async fn fetch(&self) -> Result<Vec<SessionItem>, String> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| format!("Agenda feed request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("Agenda feed returned HTTP {}", resp.status()));
        }
        resp.json::<Vec<SessionItem>>()
            .await
            .map_err(|e| format!("Agenda feed body: {}", e))
    }
}

/// 静态数据源：固定条目
pub struct StaticSource {
    items: Vec<SessionItem>,
}

impl StaticSource {
    pub fn new(items: Vec<SessionItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl CatalogSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<SessionItem>, String> {
        Ok(self.items.clone())
    }
}

/// 内置示例议程（未配置 feed_url 时的本地演示数据）
pub fn sample_agenda() -> Vec<SessionItem> {
    vec![
        SessionItem {
            slug: "defi-liquidity-design".to_string(),
            title: "DeFi liquidity design beyond AMMs".to_string(),
            description: "Order-flow auctions, intents and the next generation of on-chain liquidity.".to_string(),
            track: "DeFi".to_string(),
            speakers: vec!["Ana Ribeiro".to_string()],
            start: "2026-02-10T10:00:00".to_string(),
            end: "2026-02-10T10:45:00".to_string(),
            room: "Main Stage".to_string(),
        },
        SessionItem {
            slug: "zk-proofs-in-practice".to_string(),
            title: "ZK proofs in practice".to_string(),
            description: "A tour of zero-knowledge proving systems actually deployed today.".to_string(),
            track: "ZK".to_string(),
            speakers: vec!["Wei Zhang".to_string()],
            start: "2026-02-10T11:00:00".to_string(),
            end: "2026-02-10T11:45:00".to_string(),
            room: "Workshop A".to_string(),
        },
        SessionItem {
            slug: "rollup-interop".to_string(),
            title: "Rollup interoperability: shared sequencing and bridges".to_string(),
            description: "How rollups talk to each other, and why DeFi settlement cares.".to_string(),
            track: "Scaling".to_string(),
            speakers: vec!["Maya Chen".to_string(), "Jonas Falk".to_string()],
            start: "2026-02-10T14:00:00".to_string(),
            end: "2026-02-10T14:45:00".to_string(),
            room: "Main Stage".to_string(),
        },
        SessionItem {
            slug: "wallet-ux-workshop".to_string(),
            title: "Wallet UX workshop".to_string(),
            description: "Hands-on session on account abstraction and passkey onboarding.".to_string(),
            track: "UX".to_string(),
            speakers: vec!["Priya Nair".to_string()],
            start: "2026-02-11T09:30:00".to_string(),
            end: "2026-02-11T11:00:00".to_string(),
            room: "Workshop B".to_string(),
        },
        SessionItem {
            slug: "governance-roundtable".to_string(),
            title: "Protocol governance roundtable".to_string(),
            description: "Token voting, councils and the messy reality of decentralized governance.".to_string(),
            track: "Governance".to_string(),
            speakers: vec!["Diego Santos".to_string()],
            start: "2026-02-11T13:00:00".to_string(),
            end: "2026-02-11T14:30:00".to_string(),
            room: "Roundtable Room".to_string(),
        },
    ]
}
