//! 议程元数据工具

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::Catalog;

use super::registry::Tool;

pub struct AgendaInfoTool {
    catalog: Arc<Catalog>,
}

impl AgendaInfoTool {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for AgendaInfoTool {
    fn name(&self) -> &str {
        "agenda_info"
    }

    fn description(&self) -> &str {
        "Get agenda metadata: the list of tracks, dates, rooms and the total session count. No args."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        let info = self.catalog.agenda_info().await?;
        serde_json::to_string(&info).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{sample_agenda, StaticSource};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_metadata_shape() {
        let catalog = Catalog::new(
            Arc::new(StaticSource::new(sample_agenda())),
            Duration::from_secs(60),
        );
        let tool = AgendaInfoTool::new(Arc::new(catalog));
        let out = tool.execute(json!({})).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["total_sessions"], 5);
        assert!(parsed["tracks"].as_array().unwrap().len() >= 4);
        assert_eq!(parsed["dates"].as_array().unwrap().len(), 2);
    }
}
