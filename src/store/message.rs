//! 会话消息模型
//!
//! 消息一经追加即不可变：稳定 id、角色、带类型的分段列表。
//! 普通轮次的 id 外部分配（uuid）；后台完成注入的消息用确定性 id
//! （"<kind>-<subject>"），同 id 消息只追加一次，这是两条投递路径之间
//! 唯一的一致性机制。

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 消息分段
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    Reasoning { text: String },
    ToolCall { tool: String, args: serde_json::Value },
    ToolResult { tool: String, output: String },
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    /// 毫秒时间戳
    pub created_at: i64,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id: id.into(),
            role,
            parts,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 普通用户轮次（uuid id）
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(
            format!("msg_{}", uuid::Uuid::new_v4()),
            Role::User,
            vec![MessagePart::Text { text: text.into() }],
        )
    }

    /// 普通助手回复（uuid id）
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(
            format!("msg_{}", uuid::Uuid::new_v4()),
            Role::Assistant,
            vec![MessagePart::Text { text: text.into() }],
        )
    }

    /// 确定性 id 的助手消息（后台完成注入用，id 相同则去重）
    pub fn assistant_keyed(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            Role::Assistant,
            vec![MessagePart::Text { text: text.into() }],
        )
    }

    /// 所有文本分段拼接（供 LLM 上下文与 UI 渲染）
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                MessagePart::Text { text } | MessagePart::Reasoning { text } => {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
                MessagePart::ToolCall { tool, args } => {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&format!("Tool call: {} {}", tool, args));
                }
                MessagePart::ToolResult { tool, output } => {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&format!("Observation from {}: {}", tool, output));
                }
            }
        }
        out
    }
}
