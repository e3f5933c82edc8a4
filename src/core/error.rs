//! 助理运行错误类型
//!
//! 工具与 LLM 客户端层面的可恢复失败用 `Result<String, String>` 哨兵字符串表达，
//! 后台任务的终态失败用 `task::TaskFailure` 值表达；此处只收容真正需要向调用方
//! 传播的错误。

use thiserror::Error;

/// 控制器与组件装配过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// 当前推理轮次被用户取消（不影响进行中的后台任务）
    #[error("Turn cancelled")]
    TurnCancelled,
}
