//! 兴趣画像（派生事实）
//!
//! 只由后台分析的成功终态产出；单槽位、整体覆写；控制器只读消费。
//! 序列化为 camelCase 与推送协议对齐。

use serde::{Deserialize, Serialize};

/// 某个 subject 的兴趣画像
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestProfile {
    /// 归一化后的 handle
    pub subject_key: String,
    /// 主题列表（有界）
    pub topics: Vec<String>,
    /// 简短总结
    pub summary: String,
    /// 分析的帖子数（来源计数）
    pub items_analyzed: u32,
}

impl InterestProfile {
    /// 拼入推理上下文的画像块
    pub fn context_block(&self) -> String {
        format!(
            "Known attendee profile (from @{}, {} posts analyzed):\n- Topics: {}\n- Summary: {}",
            self.subject_key,
            self.items_analyzed,
            self.topics.join(", "),
            self.summary
        )
    }
}
