//! 单个会话的内存状态
//!
//! 消息历史、画像槽位、活动连接（推送 sink）与当前推理轮的取消令牌。
//! 首次接触时创建，不会被主动删除；clear 只截断历史与事实袋。

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::push::PushEvent;

use super::message::ChatMessage;
use super::profile::InterestProfile;

/// 会话状态机：后台分析期间仍可正常处理用户轮次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    AwaitingAnalysis,
}

/// 单个会话
pub struct SessionState {
    pub key: String,
    pub messages: Vec<ChatMessage>,
    pub profile: Option<InterestProfile>,
    pub status: SessionStatus,
    /// 活动连接：连接 id -> 推送 sink
    sinks: HashMap<String, mpsc::UnboundedSender<PushEvent>>,
    /// 当前推理轮的取消令牌
    cancel_token: Option<CancellationToken>,
    pub last_active: Instant,
    pub created_at: Instant,
}

impl SessionState {
    pub fn new(key: String) -> Self {
        Self {
            key,
            messages: Vec::new(),
            profile: None,
            status: SessionStatus::Idle,
            sinks: HashMap::new(),
            cancel_token: None,
            last_active: Instant::now(),
            created_at: Instant::now(),
        }
    }

    pub fn has_message(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// 追加消息；同 id 已存在时跳过并返回 false
    pub fn append_message(&mut self, message: ChatMessage) -> bool {
        if self.has_message(&message.id) {
            return false;
        }
        self.messages.push(message);
        self.last_active = Instant::now();
        true
    }

    /// 清空历史与事实袋（用户显式动作）
    pub fn clear(&mut self) {
        self.messages.clear();
        self.profile = None;
    }

    pub fn add_sink(&mut self, conn_id: String, tx: mpsc::UnboundedSender<PushEvent>) {
        self.sinks.insert(conn_id, tx);
        self.last_active = Instant::now();
    }

    pub fn remove_sink(&mut self, conn_id: &str) {
        self.sinks.remove(conn_id);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// 向所有活动连接广播；顺带剔除已断开的 sink
    pub fn push(&mut self, event: &PushEvent) {
        self.sinks.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// 取消当前推理轮（不影响后台任务）
    pub fn cancel_turn(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }

    /// 为新的推理轮创建取消令牌（先取消旧轮）
    pub fn new_cancel_token(&mut self) -> CancellationToken {
        self.cancel_turn();
        let token = CancellationToken::new();
        self.cancel_token = Some(token.clone());
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_dedup_by_id() {
        let mut s = SessionState::new("s1".to_string());
        assert!(s.append_message(ChatMessage::assistant_keyed("analysis-vitalik", "ready")));
        assert!(!s.append_message(ChatMessage::assistant_keyed("analysis-vitalik", "again")));
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].text(), "ready");
    }

    #[test]
    fn test_clear_truncates_messages_and_profile() {
        let mut s = SessionState::new("s1".to_string());
        s.append_message(ChatMessage::user("hi"));
        s.profile = Some(InterestProfile {
            subject_key: "vitalik".to_string(),
            topics: vec![],
            summary: String::new(),
            items_analyzed: 0,
        });
        s.clear();
        assert!(s.messages.is_empty());
        assert!(s.profile.is_none());
    }

    #[test]
    fn test_push_drops_dead_sinks() {
        let mut s = SessionState::new("s1".to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        s.add_sink("c1".to_string(), tx);
        drop(rx);
        s.push(&PushEvent::Error {
            reason: "x".to_string(),
        });
        assert_eq!(s.sink_count(), 0);
    }
}
