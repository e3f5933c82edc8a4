//! 日历导出工具
//!
//! 把选定条目生成为日历交换文档：每条目一个 VEVENT，文本字段转义，
//! 固定 VTIMEZONE 块，UID 由开始时间 + slug 化标题导出（稳定、可重复导入）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::catalog::{Catalog, SessionItem};

use super::registry::Tool;

/// 会议时区的固定 VTIMEZONE 块
const VTIMEZONE_BLOCK: &str = "BEGIN:VTIMEZONE\r\n\
TZID:Asia/Bangkok\r\n\
BEGIN:STANDARD\r\n\
DTSTART:19700101T000000\r\n\
TZOFFSETFROM:+0700\r\n\
TZOFFSETTO:+0700\r\n\
TZNAME:ICT\r\n\
END:STANDARD\r\n\
END:VTIMEZONE\r\n";

pub struct ExportTool {
    catalog: Arc<Catalog>,
}

impl ExportTool {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

/// 文本字段转义：反斜杠、分号、逗号与换行
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// 标题 slug 化：小写、非字母数字折叠为连字符
fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

/// "2026-02-10T14:00:00" -> "20260210T140000"
fn compact_time(rfc: &str) -> String {
    rfc.chars().filter(|c| *c != '-' && *c != ':').collect()
}

fn render_event(item: &SessionItem) -> String {
    let uid = format!("{}-{}@docent", compact_time(&item.start), slugify(&item.title));
    let location = if item.room.is_empty() {
        String::new()
    } else {
        format!("LOCATION:{}\r\n", escape_text(&item.room))
    };
    let description = if item.speakers.is_empty() {
        escape_text(&item.description)
    } else {
        escape_text(&format!(
            "{}\nSpeakers: {}",
            item.description,
            item.speakers.join(", ")
        ))
    };
    format!(
        "BEGIN:VEVENT\r\n\
         UID:{}\r\n\
         DTSTART;TZID=Asia/Bangkok:{}\r\n\
         DTEND;TZID=Asia/Bangkok:{}\r\n\
         SUMMARY:{}\r\n\
         DESCRIPTION:{}\r\n\
         {}\
         CATEGORIES:{}\r\n\
         END:VEVENT\r\n",
        uid,
        compact_time(&item.start),
        compact_time(&item.end),
        escape_text(&item.title),
        description,
        location,
        escape_text(&item.track),
    )
}

fn render_calendar(items: &[SessionItem]) -> String {
    let mut out = String::from(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Docent//Conference Concierge//EN\r\n\
         CALSCALE:GREGORIAN\r\n\
         METHOD:PUBLISH\r\n",
    );
    out.push_str(VTIMEZONE_BLOCK);
    for item in items {
        out.push_str(&render_event(item));
    }
    out.push_str("END:VCALENDAR\r\n");
    out
}

#[async_trait]
impl Tool for ExportTool {
    fn name(&self) -> &str {
        "export_calendar"
    }

    fn description(&self) -> &str {
        "Generate a calendar (.ics) document for selected sessions. Args: {\"slugs\": [\"...\", ...]}."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slugs": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["slugs"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let slugs: Vec<String> = args
            .get("slugs")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if slugs.is_empty() {
            return Err("Provide \"slugs\": a non-empty array of session slugs".to_string());
        }

        let items = self.catalog.items().await?;
        let mut selected = Vec::new();
        let mut skipped = Vec::new();
        for slug in &slugs {
            match items.iter().find(|i| &i.slug == slug) {
                Some(item) => selected.push(item.clone()),
                None => skipped.push(slug.clone()),
            }
        }

        if selected.is_empty() {
            return Ok("None of the requested sessions were found; nothing to export.".to_string());
        }

        let message = if skipped.is_empty() {
            format!("Calendar with {} events ready.", selected.len())
        } else {
            format!(
                "Calendar with {} events ready (unknown slugs skipped: {}).",
                selected.len(),
                skipped.join(", ")
            )
        };

        let response = json!({
            "file_content": render_calendar(&selected),
            "event_count": selected.len(),
            "message": message,
        });
        serde_json::to_string(&response).map_err(|e| e.to_string())
    }
}
