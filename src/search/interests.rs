//! 多兴趣检索：逐兴趣打分、并集排序与命中归因
//!
//! 排序键：命中的不同兴趣数降序 > 跨兴趣总分降序 > 开始时间升序。
//! matched_interests 与排序来自同一次打分，保证归因与结果一致。

use std::collections::HashMap;

use crate::catalog::SessionItem;

use super::query::{score_item, tokenize};

/// 多兴趣检索结果：排好序的条目与逐条目的兴趣归因
pub struct InterestSearch {
    pub items: Vec<SessionItem>,
    matched: HashMap<String, Vec<String>>,
}

impl InterestSearch {
    /// 某条目命中的兴趣列表（按传入兴趣的顺序）
    pub fn matched_interests(&self, slug: &str) -> &[String] {
        self.matched.get(slug).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

struct Accumulated<'a> {
    item: &'a SessionItem,
    distinct: u32,
    total_score: u32,
    matched: Vec<String>,
}

/// 逐兴趣独立打分后取并集排序
pub fn search_by_interests(items: &[SessionItem], interests: &[String]) -> InterestSearch {
    let mut acc: HashMap<&str, Accumulated> = HashMap::new();

    for interest in interests {
        let tokens = tokenize(interest);
        if tokens.is_empty() {
            continue;
        }
        for item in items {
            let score = score_item(item, &tokens);
            if score == 0 {
                continue;
            }
            let entry = acc.entry(item.slug.as_str()).or_insert_with(|| Accumulated {
                item,
                distinct: 0,
                total_score: 0,
                matched: Vec::new(),
            });
            entry.distinct += 1;
            entry.total_score += score;
            entry.matched.push(interest.clone());
        }
    }

    let mut ranked: Vec<Accumulated> = acc.into_values().collect();
    ranked.sort_by(|a, b| {
        b.distinct
            .cmp(&a.distinct)
            .then_with(|| b.total_score.cmp(&a.total_score))
            .then_with(|| a.item.start.cmp(&b.item.start))
    });

    let mut matched = HashMap::new();
    let mut result_items = Vec::with_capacity(ranked.len());
    for entry in ranked {
        matched.insert(entry.item.slug.clone(), entry.matched);
        result_items.push(entry.item.clone());
    }

    InterestSearch {
        items: result_items,
        matched,
    }
}
