//! 议程目录：条目模型、外部数据源与读穿缓存
//!
//! 条目来自外部议程服务（或内置示例数据），本核心只读不写；
//! Catalog 在数据源之上加一层带保鲜窗口的读穿缓存。

mod cache;
mod item;
mod source;

pub use cache::TtlCache;
pub use item::{AgendaInfo, SessionItem};
pub use source::{sample_agenda, CatalogSource, FeedSource, StaticSource};

use std::sync::Arc;
use std::time::Duration;

/// 缓存键：整份议程作为单一条目缓存
const AGENDA_KEY: &str = "agenda";

/// 议程目录：数据源 + 读穿缓存
pub struct Catalog {
    source: Arc<dyn CatalogSource>,
    cache: TtlCache<Vec<SessionItem>>,
    ttl: Duration,
}

impl Catalog {
    pub fn new(source: Arc<dyn CatalogSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: TtlCache::new(),
            ttl,
        }
    }

    /// 获取全部条目：缓存命中直接返回，否则回源并写入缓存
    pub async fn items(&self) -> Result<Vec<SessionItem>, String> {
        if let Some(items) = self.cache.get(AGENDA_KEY).await {
            return Ok(items);
        }
        let items = self.source.fetch().await?;
        tracing::debug!(count = items.len(), "agenda feed refreshed");
        self.cache
            .put(AGENDA_KEY.to_string(), items.clone(), self.ttl)
            .await;
        Ok(items)
    }

    /// 按 slug 查找单个条目
    pub async fn find(&self, slug: &str) -> Result<Option<SessionItem>, String> {
        let items = self.items().await?;
        Ok(items.into_iter().find(|i| i.slug == slug))
    }

    /// 议程元数据：轨道、日期、场地与条目总数
    pub async fn agenda_info(&self) -> Result<AgendaInfo, String> {
        let items = self.items().await?;
        Ok(AgendaInfo::from_items(&items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CatalogSource for CountingSource {
        async fn fetch(&self) -> Result<Vec<SessionItem>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![SessionItem::sample(
                "rollup-talk",
                "Rollups in production",
                "2026-02-10T10:00:00",
            )])
        }
    }

    #[tokio::test]
    async fn test_read_through_cache_hits_source_once() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let catalog = Catalog::new(source.clone(), Duration::from_secs(60));

        let first = catalog.items().await.unwrap();
        let second = catalog.items().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let catalog = Catalog::new(source.clone(), Duration::from_millis(10));

        catalog.items().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        catalog.items().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
