//! 议程检索工具
//!
//! 按自由查询或兴趣列表检索，支持轨道 / 日期过滤与分页；
//! 无结果时返回描述性哨兵字符串（不是错误），参数不合法同样以哨兵回给 LLM。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::catalog::{Catalog, SessionItem};
use crate::search::{filter_by_date, filter_by_track, search_by_interests, search_by_query};

use super::registry::Tool;

/// 默认返回条数
const DEFAULT_LIMIT: usize = 5;
/// 单次最多返回条数
const MAX_LIMIT: usize = 20;

pub struct SearchSessionsTool {
    catalog: Arc<Catalog>,
}

impl SearchSessionsTool {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    fn item_json(item: &SessionItem, matched: Option<&[String]>) -> Value {
        let mut obj = json!({
            "slug": item.slug,
            "title": item.title,
            "track": item.track,
            "speakers": item.speakers,
            "start": item.start,
            "end": item.end,
            "room": item.room,
        });
        if let Some(matched) = matched {
            obj["matched_interests"] = json!(matched);
        }
        obj
    }
}

#[async_trait]
impl Tool for SearchSessionsTool {
    fn name(&self) -> &str {
        "search_sessions"
    }

    fn description(&self) -> &str {
        "Search conference sessions by free-text query or a list of interests. \
         Args: {\"query\": \"...\"} or {\"interests\": [\"...\", ...]}; optional \
         \"track\", \"date\" (YYYY-MM-DD), \"limit\", \"offset\"."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "interests": { "type": "array", "items": { "type": "string" } },
                "track": { "type": "string" },
                "date": { "type": "string" },
                "limit": { "type": "integer" },
                "offset": { "type": "integer" }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args.get("query").and_then(|v| v.as_str()).map(str::trim);
        let interests: Option<Vec<String>> = args.get("interests").and_then(|v| v.as_array()).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let has_query = query.map(|q| !q.is_empty()).unwrap_or(false);
        let has_interests = interests.as_ref().map(|i| !i.is_empty()).unwrap_or(false);
        if !has_query && !has_interests {
            return Err("Provide either \"query\" (string) or \"interests\" (array of strings)".to_string());
        }

        let mut items = self.catalog.items().await?;
        if let Some(track) = args.get("track").and_then(|v| v.as_str()) {
            items = filter_by_track(&items, track);
        }
        if let Some(date) = args.get("date").and_then(|v| v.as_str()) {
            items = filter_by_date(&items, date);
        }

        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);
        let offset = args
            .get("offset")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(0);

        let (ranked, rendered): (Vec<SessionItem>, Vec<Value>) = if has_query {
            let ranked = search_by_query(&items, query.unwrap_or_default());
            let rendered = ranked
                .iter()
                .skip(offset)
                .take(limit)
                .map(|i| Self::item_json(i, None))
                .collect();
            (ranked, rendered)
        } else {
            let result = search_by_interests(&items, interests.as_deref().unwrap_or(&[]));
            let rendered = result
                .items
                .iter()
                .skip(offset)
                .take(limit)
                .map(|i| Self::item_json(i, Some(result.matched_interests(&i.slug))))
                .collect();
            (result.items, rendered)
        };

        if ranked.is_empty() {
            return Ok("No sessions matched that request. Try different keywords, or ask for the agenda overview.".to_string());
        }

        let response = json!({
            "items": rendered,
            "total_matches": ranked.len(),
            "shown": rendered.len(),
            "offset": offset,
        });
        serde_json::to_string(&response).map_err(|e| e.to_string())
    }
}
