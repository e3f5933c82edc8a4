//! 单查询检索：分词、字段权重打分与排序
//!
//! 每个 token 只计一次分，按权重从高到低找第一个包含它的字段：
//! 标题 3 分 > 轨道 / 讲者 2 分 > 描述 1 分。总分为 0 的条目被丢弃。

use crate::catalog::SessionItem;

/// 标题命中权重
const WEIGHT_TITLE: u32 = 3;
/// 轨道与讲者命中权重
const WEIGHT_TAG: u32 = 2;
/// 描述命中权重
const WEIGHT_DESCRIPTION: u32 = 1;

/// 最短有效 token 长度（更短的视为噪音）
const MIN_TOKEN_CHARS: usize = 3;

/// 分词：按空白切分、转小写，丢弃长度不足的 token
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// 单 token 得分：按权重降序检查字段，命中即停
fn token_score(item: &SessionItem, token: &str) -> u32 {
    if item.title.to_lowercase().contains(token) {
        return WEIGHT_TITLE;
    }
    if item.track.to_lowercase().contains(token) {
        return WEIGHT_TAG;
    }
    if item
        .speakers
        .iter()
        .any(|s| s.to_lowercase().contains(token))
    {
        return WEIGHT_TAG;
    }
    if item.description.to_lowercase().contains(token) {
        return WEIGHT_DESCRIPTION;
    }
    0
}

/// 条目总分：各 token 得分之和
pub fn score_item(item: &SessionItem, tokens: &[String]) -> u32 {
    tokens.iter().map(|t| token_score(item, t)).sum()
}

/// 按查询检索：打分、去零、按分数降序排序（同分按开始时间升序）
pub fn search_by_query(items: &[SessionItem], query: &str) -> Vec<SessionItem> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(u32, &SessionItem)> = items
        .iter()
        .map(|item| (score_item(item, &tokens), item))
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.start.cmp(&b.1.start)));
    scored.into_iter().map(|(_, item)| item.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<SessionItem> {
        let mut a = SessionItem::sample("a", "DeFi liquidity design", "2026-02-10T10:00:00");
        a.description = "on-chain markets".to_string();
        let mut b = SessionItem::sample("b", "Wallet UX workshop", "2026-02-10T09:00:00");
        b.description = "mentions defi onboarding".to_string();
        let mut c = SessionItem::sample("c", "Governance roundtable", "2026-02-10T11:00:00");
        c.track = "Governance".to_string();
        vec![a, b, c]
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        assert_eq!(tokenize("I'm into ZK as of now"), vec!["i'm", "into", "now"]);
        assert!(tokenize("a an of").is_empty());
    }

    #[test]
    fn test_title_outranks_description() {
        let results = search_by_query(&items(), "defi");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].slug, "a"); // 标题命中 3 分 > 描述命中 1 分
        assert_eq!(results[1].slug, "b");
    }

    #[test]
    fn test_zero_score_items_dropped() {
        let results = search_by_query(&items(), "cooking recipes");
        assert!(results.is_empty());
    }

    #[test]
    fn test_token_counts_once_via_best_field() {
        let mut item = SessionItem::sample("x", "DeFi deep dive", "2026-02-10T10:00:00");
        item.description = "everything about defi".to_string();
        let tokens = tokenize("defi");
        // 标题与描述都包含，但只取最高权重字段
        assert_eq!(score_item(&item, &tokens), 3);
    }

    #[test]
    fn test_tie_breaks_by_start_time() {
        let mut x = SessionItem::sample("later", "Rust for protocols", "2026-02-10T15:00:00");
        x.description = String::new();
        let mut y = SessionItem::sample("earlier", "Rust for wallets", "2026-02-10T09:00:00");
        y.description = String::new();
        let results = search_by_query(&[x, y], "rust");
        assert_eq!(results[0].slug, "earlier");
        assert_eq!(results[1].slug, "later");
    }

    #[test]
    fn test_whitespace_insensitive() {
        let base = search_by_query(&items(), "defi liquidity");
        let noisy = search_by_query(&items(), "  DeFi   LIQUIDITY  ");
        let base_slugs: Vec<_> = base.iter().map(|i| &i.slug).collect();
        let noisy_slugs: Vec<_> = noisy.iter().map(|i| &i.slug).collect();
        assert_eq!(base_slugs, noisy_slugs);
    }
}
