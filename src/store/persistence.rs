//! 会话持久化（SQLite）
//!
//! messages 表以消息 id 为主键，INSERT OR IGNORE 与内存端的去重不变式一致；
//! profiles 表每会话一行，整体覆写。启动时恢复全部会话。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use super::message::{ChatMessage, MessagePart, Role};
use super::profile::InterestProfile;

/// SQLite 会话库
pub struct SessionDb {
    conn: Mutex<Connection>,
}

impl SessionDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_key TEXT NOT NULL,
                role TEXT NOT NULL,
                parts TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_key);
            CREATE TABLE IF NOT EXISTS profiles (
                session_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 写入消息；id 已存在时为空操作，返回是否实际插入
    pub fn insert_message(
        &self,
        session_key: &str,
        message: &ChatMessage,
    ) -> Result<bool, rusqlite::Error> {
        let parts = serde_json::to_string(&message.parts).unwrap_or_else(|_| "[]".to_string());
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO messages (id, session_key, role, parts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![message.id, session_key, role, parts, message.created_at],
        )?;
        Ok(inserted > 0)
    }

    /// 整体覆写某会话的画像
    pub fn save_profile(
        &self,
        session_key: &str,
        profile: &InterestProfile,
    ) -> Result<(), rusqlite::Error> {
        let payload = serde_json::to_string(profile).unwrap_or_default();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO profiles (session_key, payload) VALUES (?1, ?2)",
            params![session_key, payload],
        )?;
        Ok(())
    }

    pub fn clear_profile(&self, session_key: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM profiles WHERE session_key = ?1",
            params![session_key],
        )?;
        Ok(())
    }

    /// 清空某会话（历史与画像）
    pub fn clear_session(&self, session_key: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM messages WHERE session_key = ?1",
            params![session_key],
        )?;
        conn.execute(
            "DELETE FROM profiles WHERE session_key = ?1",
            params![session_key],
        )?;
        Ok(())
    }

    /// 恢复全部会话：key -> (按写入顺序的消息, 画像)
    #[allow(clippy::type_complexity)]
    pub fn load_all(
        &self,
    ) -> Result<HashMap<String, (Vec<ChatMessage>, Option<InterestProfile>)>, rusqlite::Error>
    {
        let conn = self.conn.lock().unwrap();
        let mut sessions: HashMap<String, (Vec<ChatMessage>, Option<InterestProfile>)> =
            HashMap::new();

        let mut stmt = conn.prepare(
            "SELECT session_key, id, role, parts, created_at
             FROM messages ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let session_key: String = row.get(0)?;
            let id: String = row.get(1)?;
            let role: String = row.get(2)?;
            let parts: String = row.get(3)?;
            let created_at: i64 = row.get(4)?;
            Ok((session_key, id, role, parts, created_at))
        })?;

        for row in rows {
            let (session_key, id, role, parts_json, created_at) = row?;
            let parts: Vec<MessagePart> =
                serde_json::from_str(&parts_json).unwrap_or_default();
            let role = match role.as_str() {
                "user" => Role::User,
                _ => Role::Assistant,
            };
            let message = ChatMessage {
                id,
                role,
                parts,
                created_at,
            };
            sessions
                .entry(session_key)
                .or_insert_with(|| (Vec::new(), None))
                .0
                .push(message);
        }

        let mut stmt = conn.prepare("SELECT session_key, payload FROM profiles")?;
        let rows = stmt.query_map([], |row| {
            let session_key: String = row.get(0)?;
            let payload: String = row.get(1)?;
            Ok((session_key, payload))
        })?;
        for row in rows {
            let (session_key, payload) = row?;
            if let Ok(profile) = serde_json::from_str::<InterestProfile>(&payload) {
                sessions
                    .entry(session_key)
                    .or_insert_with(|| (Vec::new(), None))
                    .1 = Some(profile);
            }
        }

        Ok(sessions)
    }
}
