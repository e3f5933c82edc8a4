//! 推送协议定义
//!
//! 后台任务经控制器推给活动连接的三种事件：进度 / 成功 / 失败。
//! 进度事件尽力而为、至少一次，消费方需容忍重复与缺失的中间百分比；
//! 只有终态事件是权威的。

use serde::{Deserialize, Serialize};

use crate::store::InterestProfile;

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Complete,
    Error,
}

/// 推送事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// 步骤进度
    Progress {
        step: String,
        status: StepStatus,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        percent: Option<f32>,
    },
    /// 分析成功，携带画像
    Complete { result: InterestProfile },
    /// 分析失败
    Error { reason: String },
}
