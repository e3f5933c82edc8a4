//! 单条目详情工具

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::catalog::Catalog;

use super::registry::Tool;

pub struct SessionDetailsTool {
    catalog: Arc<Catalog>,
}

impl SessionDetailsTool {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for SessionDetailsTool {
    fn name(&self) -> &str {
        "session_details"
    }

    fn description(&self) -> &str {
        "Look up the full details of one session by its slug. Args: {\"slug\": \"...\"}."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string" }
            },
            "required": ["slug"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let slug = args
            .get("slug")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        if slug.is_empty() {
            return Err("Missing \"slug\"".to_string());
        }

        match self.catalog.find(slug).await? {
            Some(item) => serde_json::to_string(&item).map_err(|e| e.to_string()),
            // 合法的「查无此条目」：描述性哨兵，不是错误
            None => Ok(format!("No session found with slug '{}'", slug)),
        }
    }
}
