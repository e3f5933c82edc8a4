//! 会话管理器
//!
//! 所有会话放在一个 RwLock<HashMap> 后面，经 with_session 闭包访问；
//! 对同一会话的修改由写锁串行化。可选挂接 SQLite 持久化（尽力而为，
//! 失败只记日志不阻断对话）。

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::push::PushEvent;

use super::message::ChatMessage;
use super::persistence::SessionDb;
use super::profile::InterestProfile;
use super::session::{SessionState, SessionStatus};

/// 会话存储：内存状态 + 可选持久化
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
    db: Option<SessionDb>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            db: None,
        }
    }

    /// 挂接持久化并恢复已有会话
    pub fn with_persistence(db: SessionDb) -> Result<Self, rusqlite::Error> {
        let restored = db.load_all()?;
        let mut sessions = HashMap::new();
        for (key, (messages, profile)) in restored {
            let mut state = SessionState::new(key.clone());
            state.messages = messages;
            state.profile = profile;
            sessions.insert(key, state);
        }
        if !sessions.is_empty() {
            tracing::info!(count = sessions.len(), "restored sessions from database");
        }
        Ok(Self {
            sessions: RwLock::new(sessions),
            db: Some(db),
        })
    }

    /// 获取（或创建）会话并在写锁内执行闭包，同一会话的修改由此串行化
    pub async fn with_session<F, R>(&self, key: &str, f: F) -> R
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let state = sessions
            .entry(key.to_string())
            .or_insert_with(|| SessionState::new(key.to_string()));
        f(state)
    }

    /// 追加消息（id 去重）；实际插入时同步持久化
    pub async fn append_message(&self, key: &str, message: ChatMessage) -> bool {
        let persisted = message.clone();
        let appended = self
            .with_session(key, |s| s.append_message(message))
            .await;
        if appended {
            if let Some(db) = &self.db {
                if let Err(e) = db.insert_message(key, &persisted) {
                    tracing::warn!(session = key, "failed to persist message: {}", e);
                }
            }
        }
        appended
    }

    pub async fn history(&self, key: &str) -> Vec<ChatMessage> {
        self.with_session(key, |s| s.messages.clone()).await
    }

    /// 清空历史与画像（用户显式动作）
    pub async fn clear(&self, key: &str) {
        self.with_session(key, |s| s.clear()).await;
        if let Some(db) = &self.db {
            if let Err(e) = db.clear_session(key) {
                tracing::warn!(session = key, "failed to clear persisted session: {}", e);
            }
        }
    }

    pub async fn profile(&self, key: &str) -> Option<InterestProfile> {
        self.with_session(key, |s| s.profile.clone()).await
    }

    /// 整体覆写画像槽位（后台任务的状态合并入口）
    pub async fn set_profile(&self, key: &str, profile: InterestProfile) {
        let persisted = profile.clone();
        self.with_session(key, |s| s.profile = Some(profile)).await;
        if let Some(db) = &self.db {
            if let Err(e) = db.save_profile(key, &persisted) {
                tracing::warn!(session = key, "failed to persist profile: {}", e);
            }
        }
    }

    /// 若现有画像属于其他 subject 则清掉，返回是否清理了旧画像
    pub async fn clear_stale_profile(&self, key: &str, subject: &str) -> bool {
        let cleared = self
            .with_session(key, |s| match &s.profile {
                Some(p) if p.subject_key != subject => {
                    s.profile = None;
                    true
                }
                _ => false,
            })
            .await;
        if cleared {
            if let Some(db) = &self.db {
                if let Err(e) = db.clear_profile(key) {
                    tracing::warn!(session = key, "failed to clear persisted profile: {}", e);
                }
            }
        }
        cleared
    }

    pub async fn set_status(&self, key: &str, status: SessionStatus) {
        self.with_session(key, |s| s.status = status).await;
    }

    pub async fn status(&self, key: &str) -> SessionStatus {
        self.with_session(key, |s| s.status).await
    }

    /// 注册活动连接
    pub async fn add_sink(&self, key: &str, conn_id: &str, tx: mpsc::UnboundedSender<PushEvent>) {
        self.with_session(key, |s| s.add_sink(conn_id.to_string(), tx))
            .await;
    }

    pub async fn remove_sink(&self, key: &str, conn_id: &str) {
        self.with_session(key, |s| s.remove_sink(conn_id)).await;
    }

    /// 向会话的所有活动连接广播
    pub async fn push(&self, key: &str, event: &PushEvent) {
        self.with_session(key, |s| s.push(event)).await;
    }

    /// 为新的推理轮创建取消令牌
    pub async fn new_cancel_token(&self, key: &str) -> CancellationToken {
        self.with_session(key, |s| s.new_cancel_token()).await
    }

    /// 取消当前推理轮（不影响后台任务）
    pub async fn cancel_turn(&self, key: &str) {
        self.with_session(key, |s| s.cancel_turn()).await;
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
