//! 步骤重试策略与执行器
//!
//! 尝试循环 + 延迟调度 + 截止时间，与步骤体做什么无关，可用假步骤函数
//! 单独测试。第 a 次失败后的延迟为 base_delay * multiplier^(a-1)；
//! 超时的尝试同样计入 max_attempts。

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

/// 单步重试策略
#[derive(Debug, Clone)]
pub struct StepPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: u32,
    /// 单次尝试的截止时间
    pub timeout: Duration,
}

impl StepPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        backoff_multiplier: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_multiplier,
            timeout,
        }
    }

    /// 第 attempt 次（1 起）失败后的退避延迟
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// 步骤在用尽重试后的失败：保留最后一次尝试的原因
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub step: String,
    pub cause: String,
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step '{}' failed: {}", self.step, self.cause)
    }
}

/// 执行一个步骤：按策略重试，全部失败则返回携带最后原因的 StepFailure
pub async fn run_step<T, F, Fut>(step: &str, policy: &StepPolicy, mut body: F) -> Result<T, StepFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let mut last_cause = String::new();

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            let delay = policy.delay_after(attempt - 1);
            tracing::debug!(step, attempt, ?delay, "retrying after backoff");
            sleep(delay).await;
        }

        match timeout(policy.timeout, body()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    tracing::debug!(step, attempt, "step succeeded after retries");
                }
                return Ok(value);
            }
            Ok(Err(cause)) => {
                tracing::warn!(step, attempt, max = policy.max_attempts, "step attempt failed: {}", cause);
                last_cause = cause;
            }
            Err(_) => {
                last_cause = format!("attempt timed out after {:?}", policy.timeout);
                tracing::warn!(step, attempt, max = policy.max_attempts, "step attempt timed out");
            }
        }
    }

    Err(StepFailure {
        step: step.to_string(),
        cause: last_cause,
    })
}
