//! 后台任务引擎
//!
//! 每个 Run 是一条固定的具名步骤流水线：步骤独立重试（有界指数退避 + 单次
//! 尝试超时），引擎对外只发进度事件和恰好一次的终态结果（成功值或类型化
//! 失败值），任何故障都不会以未处理错误的形式逃出引擎边界。

mod engine;
mod policy;
mod progress;

pub use engine::{AnalysisConfig, AnalysisEngine, RunHandle};
pub use policy::{run_step, StepFailure, StepPolicy};
pub use progress::{ProgressUpdate, TaskEvent, TaskFailure, TaskOutcome, TaskPayload};
