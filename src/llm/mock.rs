//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 可预置一队脚本化回复，依次弹出；队列耗尽后回显最后一条 User 消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, LlmMessage, LlmRole};

/// Mock 客户端：脚本化回复或回显
#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置脚本化回复（按顺序消费）
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            scripted: Mutex::new(responses.into()),
        }
    }

    /// 追加一条脚本化回复
    pub fn push_response(&self, response: impl Into<String>) {
        self.scripted.lock().unwrap().push_back(response.into());
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[LlmMessage]) -> Result<String, String> {
        if let Some(next) = self.scripted.lock().unwrap().pop_front() {
            return Ok(next);
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, LlmRole::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("Echo from Mock: {}", last_user))
    }

    async fn complete_stream(
        &self,
        messages: &[LlmMessage],
    ) -> Result<std::pin::Pin<Box<dyn futures_util::Stream<Item = Result<String, String>> + Send>>, String>
    {
        let content = self.complete(messages).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }
}
