//! 轨道与日期过滤
//!
//! 纯函数、保持输入顺序：轨道为大小写不敏感的子串匹配，日期为开始时间的前缀匹配。

use crate::catalog::SessionItem;

/// 按轨道过滤（大小写不敏感子串）
pub fn filter_by_track(items: &[SessionItem], track: &str) -> Vec<SessionItem> {
    let needle = track.to_lowercase();
    items
        .iter()
        .filter(|i| i.track.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// 按日期过滤（开始时间前缀精确匹配，如 "2026-02-10"）
pub fn filter_by_date(items: &[SessionItem], date: &str) -> Vec<SessionItem> {
    items
        .iter()
        .filter(|i| i.start.starts_with(date))
        .cloned()
        .collect()
}
