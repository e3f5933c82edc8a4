//! 议程条目模型
//!
//! 条目一经加载即不可变；start/end 为本地时间的 RFC 3339 字符串
//! （同一格式下字典序即时间序，日期过滤用前缀匹配）。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 单个议程条目（讲座 / 工作坊 / 圆桌）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionItem {
    /// 稳定标识（URL 友好）
    pub slug: String,
    pub title: String,
    pub description: String,
    /// 轨道（分类标签，如 "DeFi"、"Scaling"）
    pub track: String,
    /// 讲者名单
    #[serde(default)]
    pub speakers: Vec<String>,
    /// 开始时间，如 "2026-02-10T14:00:00"
    pub start: String,
    /// 结束时间
    pub end: String,
    /// 场地标签
    #[serde(default)]
    pub room: String,
}

impl SessionItem {
    /// 取开始时间的日期部分（"2026-02-10"）
    pub fn start_date(&self) -> &str {
        self.start.split('T').next().unwrap_or(&self.start)
    }

    #[cfg(test)]
    pub fn sample(slug: &str, title: &str, start: &str) -> Self {
        Self {
            slug: slug.to_string(),
            title: title.to_string(),
            description: String::new(),
            track: "General".to_string(),
            speakers: Vec::new(),
            start: start.to_string(),
            end: start.to_string(),
            room: "Main".to_string(),
        }
    }
}

/// 议程元数据（供 agenda_info 工具返回）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaInfo {
    pub tracks: Vec<String>,
    pub dates: Vec<String>,
    pub rooms: Vec<String>,
    pub total_sessions: usize,
}

impl AgendaInfo {
    pub fn from_items(items: &[SessionItem]) -> Self {
        let tracks: BTreeSet<String> = items.iter().map(|i| i.track.clone()).collect();
        let dates: BTreeSet<String> = items.iter().map(|i| i.start_date().to_string()).collect();
        let rooms: BTreeSet<String> = items
            .iter()
            .map(|i| i.room.clone())
            .filter(|r| !r.is_empty())
            .collect();
        Self {
            tracks: tracks.into_iter().collect(),
            dates: dates.into_iter().collect(),
            rooms: rooms.into_iter().collect(),
            total_sessions: items.len(),
        }
    }
}
