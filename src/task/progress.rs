//! 任务事件：进度与终态
//!
//! 引擎经无界通道把事件发给控制器侧的分发循环；进度是尽力而为的，
//! 终态每个 Run 恰好一条。

use crate::push::{PushEvent, StepStatus};
use crate::store::InterestProfile;

/// 步骤进度
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub step: String,
    pub status: StepStatus,
    pub message: String,
    /// [0,1]；中间值可缺失，消费方不得依赖
    pub percent: Option<f32>,
}

impl From<ProgressUpdate> for PushEvent {
    fn from(p: ProgressUpdate) -> Self {
        PushEvent::Progress {
            step: p.step,
            status: p.status,
            message: p.message,
            percent: p.percent,
        }
    }
}

/// Run 的类型化失败值（不是 panic，不是 Err 传播）
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub subject: String,
    pub reason: String,
}

/// Run 的终态：成功画像或类型化失败
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success(InterestProfile),
    Failure(TaskFailure),
}

/// 引擎发出的事件
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub session_key: String,
    pub run_id: String,
    pub payload: TaskPayload,
}

#[derive(Debug, Clone)]
pub enum TaskPayload {
    Progress(ProgressUpdate),
    /// 每个 Run 恰好一条
    Terminal(TaskOutcome),
}
