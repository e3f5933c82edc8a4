//! 画像分析引擎
//!
//! 固定三步流水线：fetch（抓取帖子）→ summarize（LLM 归纳主题与总结）→
//! merge（写入会话画像槽位并报告成功）。fetch 零可用输入时提前终止；
//! summarize 输出不合法时回退到明确标注的尽力画像而不是失败。
//! Run 作为独立异步任务执行，完成时不假设会话处于任何特定状态。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::AnalysisSection;
use crate::llm::LlmClient;
use crate::push::StepStatus;
use crate::scrape::{ScrapeProvider, ScrapedPost};
use crate::store::{InterestProfile, SessionStore};

use super::policy::{run_step, StepPolicy};
use super::progress::{ProgressUpdate, TaskEvent, TaskFailure, TaskOutcome, TaskPayload};

/// 摘要步骤的 system prompt
const SUMMARIZE_SYSTEM: &str = "You distill a person's interests from their recent social posts. \
Reply with JSON only: {\"topics\": [\"short topic\", ...], \"summary\": \"one or two sentences\"}. \
Topics are short noun phrases about technology and professional interests. No markdown, no commentary.";

/// 单条帖子拼入 prompt 的最大字符数
const POST_PREVIEW_CHARS: usize = 500;

/// 分析流水线配置
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub max_posts: usize,
    pub max_topics: usize,
    pub fetch: StepPolicy,
    pub summarize: StepPolicy,
}

impl AnalysisConfig {
    pub fn from_section(section: &AnalysisSection, max_posts: usize) -> Self {
        Self {
            max_posts,
            max_topics: section.max_topics,
            fetch: StepPolicy::new(
                section.fetch_max_attempts,
                Duration::from_secs(section.fetch_base_delay_secs),
                section.backoff_multiplier,
                Duration::from_secs(section.fetch_timeout_secs),
            ),
            summarize: StepPolicy::new(
                section.summarize_max_attempts,
                Duration::from_secs(section.summarize_base_delay_secs),
                section.backoff_multiplier,
                Duration::from_secs(section.summarize_timeout_secs),
            ),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from_section(&AnalysisSection::default(), 50)
    }
}

/// 一次 Run 的句柄
pub struct RunHandle {
    pub run_id: String,
    pub subject: String,
    handle: JoinHandle<()>,
}

impl RunHandle {
    /// 等待 Run 结束（测试与优雅停机用；正常路径不需要等）
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// 画像分析引擎
pub struct AnalysisEngine {
    scraper: Arc<dyn ScrapeProvider>,
    llm: Arc<dyn LlmClient>,
    store: Arc<SessionStore>,
    events_tx: mpsc::UnboundedSender<TaskEvent>,
    config: AnalysisConfig,
}

impl AnalysisEngine {
    pub fn new(
        scraper: Arc<dyn ScrapeProvider>,
        llm: Arc<dyn LlmClient>,
        store: Arc<SessionStore>,
        config: AnalysisConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                scraper,
                llm,
                store,
                events_tx,
                config,
            },
            events_rx,
        )
    }

    /// 启动一次分析 Run（立即返回，Run 独立执行）
    pub fn start(&self, session_key: &str, subject: &str) -> RunHandle {
        let run_id = format!("run_{}", uuid::Uuid::new_v4());
        let ctx = RunContext {
            session_key: session_key.to_string(),
            run_id: run_id.clone(),
            subject: subject.to_string(),
            scraper: Arc::clone(&self.scraper),
            llm: Arc::clone(&self.llm),
            store: Arc::clone(&self.store),
            events_tx: self.events_tx.clone(),
            config: self.config.clone(),
        };

        tracing::info!(session = session_key, subject, run_id = %run_id, "starting profile analysis");

        let handle = tokio::spawn(run_analysis(ctx));
        RunHandle {
            run_id,
            subject: subject.to_string(),
            handle,
        }
    }
}

struct RunContext {
    session_key: String,
    run_id: String,
    subject: String,
    scraper: Arc<dyn ScrapeProvider>,
    llm: Arc<dyn LlmClient>,
    store: Arc<SessionStore>,
    events_tx: mpsc::UnboundedSender<TaskEvent>,
    config: AnalysisConfig,
}

impl RunContext {
    fn emit_progress(&self, step: &str, status: StepStatus, message: String, percent: Option<f32>) {
        let _ = self.events_tx.send(TaskEvent {
            session_key: self.session_key.clone(),
            run_id: self.run_id.clone(),
            payload: TaskPayload::Progress(ProgressUpdate {
                step: step.to_string(),
                status,
                message,
                percent,
            }),
        });
    }
}

/// Run 主体：流水线的任何失败都收敛为终态值，终态恰好投递一次
async fn run_analysis(ctx: RunContext) {
    let outcome = match execute_pipeline(&ctx).await {
        Ok(profile) => TaskOutcome::Success(profile),
        Err(failure) => {
            tracing::warn!(
                session = %ctx.session_key,
                subject = %failure.subject,
                "analysis run failed: {}",
                failure.reason
            );
            TaskOutcome::Failure(failure)
        }
    };

    let _ = ctx.events_tx.send(TaskEvent {
        session_key: ctx.session_key.clone(),
        run_id: ctx.run_id.clone(),
        payload: TaskPayload::Terminal(outcome),
    });
}

async fn execute_pipeline(ctx: &RunContext) -> Result<InterestProfile, TaskFailure> {
    // Step 1: fetch
    ctx.emit_progress(
        "fetch",
        StepStatus::Running,
        format!("Fetching recent posts for @{}", ctx.subject),
        Some(0.05),
    );

    let scraper = Arc::clone(&ctx.scraper);
    let subject = ctx.subject.clone();
    let max_posts = ctx.config.max_posts;
    let posts = run_step("fetch", &ctx.config.fetch, move || {
        let scraper = Arc::clone(&scraper);
        let subject = subject.clone();
        async move { scraper.scrape(&subject, max_posts).await }
    })
    .await
    .map_err(|f| {
        ctx.emit_progress("fetch", StepStatus::Error, f.cause.clone(), None);
        TaskFailure {
            subject: ctx.subject.clone(),
            reason: format!("could not fetch posts: {}", f.cause),
        }
    })?;

    // 零可用输入：继续流水线没有意义，经同一终态路径提前终止
    if posts.is_empty() {
        ctx.emit_progress(
            "fetch",
            StepStatus::Error,
            format!("No public posts found for @{}", ctx.subject),
            None,
        );
        return Err(TaskFailure {
            subject: ctx.subject.clone(),
            reason: "no public posts found".to_string(),
        });
    }

    ctx.emit_progress(
        "fetch",
        StepStatus::Complete,
        format!("Fetched {} posts", posts.len()),
        Some(0.35),
    );

    // Step 2: summarize
    ctx.emit_progress(
        "summarize",
        StepStatus::Running,
        "Summarizing interests".to_string(),
        Some(0.4),
    );

    let user_prompt = build_summarize_prompt(&ctx.subject, &posts);
    let llm = Arc::clone(&ctx.llm);
    let raw = run_step("summarize", &ctx.config.summarize, move || {
        let llm = Arc::clone(&llm);
        let user_prompt = user_prompt.clone();
        async move { llm.generate(SUMMARIZE_SYSTEM, &user_prompt).await }
    })
    .await
    .map_err(|f| {
        ctx.emit_progress("summarize", StepStatus::Error, f.cause.clone(), None);
        TaskFailure {
            subject: ctx.subject.clone(),
            reason: format!("could not summarize posts: {}", f.cause),
        }
    })?;

    // 输出不合法不算失败：回退到明确标注的尽力画像
    let profile = parse_profile(&raw, &ctx.subject, posts.len() as u32, ctx.config.max_topics)
        .unwrap_or_else(|| {
            tracing::warn!(subject = %ctx.subject, "malformed summarizer output, using best-effort profile");
            fallback_profile(&ctx.subject, posts.len() as u32)
        });

    ctx.emit_progress(
        "summarize",
        StepStatus::Complete,
        format!("Identified {} topics", profile.topics.len()),
        Some(0.75),
    );

    // Step 3: merge，先合并派生状态，再报告成功
    ctx.emit_progress(
        "merge",
        StepStatus::Running,
        "Saving profile".to_string(),
        Some(0.85),
    );
    ctx.store.set_profile(&ctx.session_key, profile.clone()).await;
    ctx.emit_progress(
        "merge",
        StepStatus::Complete,
        format!("Profile ready for @{}", ctx.subject),
        Some(1.0),
    );

    Ok(profile)
}

fn build_summarize_prompt(subject: &str, posts: &[ScrapedPost]) -> String {
    let mut prompt = format!("Recent posts from @{}:\n", subject);
    for post in posts {
        let preview: String = post.text.chars().take(POST_PREVIEW_CHARS).collect();
        prompt.push_str("- ");
        prompt.push_str(&preview);
        prompt.push('\n');
    }
    prompt
}

/// 解析摘要输出：容忍 ```json 围栏与夹杂文字，结构不对返回 None
fn parse_profile(
    raw: &str,
    subject: &str,
    items_analyzed: u32,
    max_topics: usize,
) -> Option<InterestProfile> {
    let trimmed = raw.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        if end < start {
            return None;
        }
        &trimmed[start..=end]
    };

    #[derive(serde::Deserialize)]
    struct RawProfile {
        topics: Vec<String>,
        summary: String,
    }

    let parsed: RawProfile = serde_json::from_str(json_str).ok()?;
    let topics: Vec<String> = parsed
        .topics
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .take(max_topics)
        .collect();
    if topics.is_empty() || parsed.summary.trim().is_empty() {
        return None;
    }

    Some(InterestProfile {
        subject_key: subject.to_string(),
        topics,
        summary: parsed.summary.trim().to_string(),
        items_analyzed,
    })
}

/// 尽力画像：摘要输出不可用时的通用回退，明确标注为近似结果
fn fallback_profile(subject: &str, items_analyzed: u32) -> InterestProfile {
    InterestProfile {
        subject_key: subject.to_string(),
        topics: vec!["general conference topics".to_string()],
        summary: "Best-effort profile: the summarizer output could not be read, so treat \
                  these interests as approximate."
            .to_string(),
        items_analyzed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::MockScrapeProvider;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 记录是否被调用的脚本化 LLM
    struct ProbeLlm {
        response: String,
        called: AtomicBool,
    }

    #[async_trait::async_trait]
    impl LlmClient for ProbeLlm {
        async fn complete(&self, _messages: &[crate::llm::LlmMessage]) -> Result<String, String> {
            self.called.store(true, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        async fn complete_stream(
            &self,
            messages: &[crate::llm::LlmMessage],
        ) -> Result<
            std::pin::Pin<Box<dyn futures_util::Stream<Item = Result<String, String>> + Send>>,
            String,
        > {
            let content = self.complete(messages).await?;
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(content)])))
        }
    }

    fn fast_config() -> AnalysisConfig {
        AnalysisConfig {
            max_posts: 10,
            max_topics: 8,
            fetch: StepPolicy::new(
                3,
                Duration::from_millis(1),
                2,
                Duration::from_millis(200),
            ),
            summarize: StepPolicy::new(
                2,
                Duration::from_millis(1),
                2,
                Duration::from_millis(200),
            ),
        }
    }

    async fn drain_until_terminal(
        rx: &mut mpsc::UnboundedReceiver<TaskEvent>,
    ) -> (Vec<ProgressUpdate>, TaskOutcome) {
        let mut progress = Vec::new();
        while let Some(event) = rx.recv().await {
            match event.payload {
                TaskPayload::Progress(p) => progress.push(p),
                TaskPayload::Terminal(outcome) => return (progress, outcome),
            }
        }
        panic!("channel closed before terminal event");
    }

    #[tokio::test]
    async fn test_successful_pipeline_merges_profile() {
        let scraper = Arc::new(
            MockScrapeProvider::new()
                .with_posts("vitalik", vec!["zk rollups are the endgame", "daily defi rates"]),
        );
        let llm = Arc::new(ProbeLlm {
            response: r#"{"topics": ["ZK rollups", "DeFi"], "summary": "Deep in scaling and on-chain finance."}"#.to_string(),
            called: AtomicBool::new(false),
        });
        let store = Arc::new(SessionStore::new());
        let (engine, mut rx) = AnalysisEngine::new(scraper, llm, Arc::clone(&store), fast_config());

        engine.start("s1", "vitalik").join().await;

        let (progress, outcome) = drain_until_terminal(&mut rx).await;
        assert!(progress.iter().any(|p| p.step == "fetch"));
        assert!(progress.iter().any(|p| p.step == "merge" && p.status == StepStatus::Complete));

        match outcome {
            TaskOutcome::Success(profile) => {
                assert_eq!(profile.subject_key, "vitalik");
                assert_eq!(profile.topics, vec!["ZK rollups", "DeFi"]);
                assert_eq!(profile.items_analyzed, 2);
            }
            TaskOutcome::Failure(f) => panic!("unexpected failure: {}", f.reason),
        }

        // merge 步骤已把画像写入会话
        let stored = store.profile("s1").await.unwrap();
        assert_eq!(stored.subject_key, "vitalik");
    }

    #[tokio::test]
    async fn test_zero_posts_exits_early_without_summarize() {
        let scraper = Arc::new(MockScrapeProvider::new());
        let llm = Arc::new(ProbeLlm {
            response: String::new(),
            called: AtomicBool::new(false),
        });
        let llm_probe = Arc::clone(&llm);
        let store = Arc::new(SessionStore::new());
        let (engine, mut rx) = AnalysisEngine::new(scraper, llm, Arc::clone(&store), fast_config());

        engine.start("s1", "ghost").join().await;

        let (_, outcome) = drain_until_terminal(&mut rx).await;
        match outcome {
            TaskOutcome::Failure(f) => {
                assert_eq!(f.subject, "ghost");
                assert!(f.reason.contains("no public posts"));
            }
            TaskOutcome::Success(_) => panic!("expected early-exit failure"),
        }
        // summarize 步骤从未被尝试
        assert!(!llm_probe.called.load(Ordering::SeqCst));
        assert!(store.profile("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_transient_fetch_failures_are_retried() {
        let scraper = Arc::new(
            MockScrapeProvider::new()
                .with_posts("vitalik", vec!["governance is hard"])
                .failing_first(2),
        );
        let llm = Arc::new(ProbeLlm {
            response: r#"{"topics": ["governance"], "summary": "Thinks about voting."}"#.to_string(),
            called: AtomicBool::new(false),
        });
        let store = Arc::new(SessionStore::new());
        let (engine, mut rx) = AnalysisEngine::new(scraper, llm, store, fast_config());

        engine.start("s1", "vitalik").join().await;

        let (_, outcome) = drain_until_terminal(&mut rx).await;
        assert!(matches!(outcome, TaskOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_exhausted_fetch_reports_single_terminal_failure() {
        let scraper = Arc::new(
            MockScrapeProvider::new()
                .with_posts("vitalik", vec!["unreachable"])
                .failing_first(10),
        );
        let llm = Arc::new(ProbeLlm {
            response: String::new(),
            called: AtomicBool::new(false),
        });
        let store = Arc::new(SessionStore::new());
        let (engine, mut rx) = AnalysisEngine::new(scraper, llm, store, fast_config());

        engine.start("s1", "vitalik").join().await;

        let (_, outcome) = drain_until_terminal(&mut rx).await;
        match outcome {
            TaskOutcome::Failure(f) => {
                // 终态携带最后一次尝试的原因
                assert!(f.reason.contains("transient scrape failure"));
            }
            TaskOutcome::Success(_) => panic!("expected failure"),
        }
        // 终态之后不再有事件
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_summary_falls_back_to_best_effort() {
        let scraper =
            Arc::new(MockScrapeProvider::new().with_posts("vitalik", vec!["hello world"]));
        let llm = Arc::new(ProbeLlm {
            response: "Sure! Here are the topics I found.".to_string(),
            called: AtomicBool::new(false),
        });
        let store = Arc::new(SessionStore::new());
        let (engine, mut rx) = AnalysisEngine::new(scraper, llm, Arc::clone(&store), fast_config());

        engine.start("s1", "vitalik").join().await;

        let (_, outcome) = drain_until_terminal(&mut rx).await;
        match outcome {
            TaskOutcome::Success(profile) => {
                assert!(profile.summary.starts_with("Best-effort profile"));
            }
            TaskOutcome::Failure(f) => panic!("fallback should not fail: {}", f.reason),
        }
    }

    #[test]
    fn test_parse_profile_fenced_json() {
        let raw = "```json\n{\"topics\": [\"ZK\"], \"summary\": \"proofs\"}\n```";
        let profile = parse_profile(raw, "v", 3, 8).unwrap();
        assert_eq!(profile.topics, vec!["ZK"]);
        assert_eq!(profile.items_analyzed, 3);
    }

    #[test]
    fn test_parse_profile_caps_topics() {
        let raw = r#"{"topics": ["a1","a2","a3","a4"], "summary": "s"}"#;
        let profile = parse_profile(raw, "v", 1, 2).unwrap();
        assert_eq!(profile.topics.len(), 2);
    }

    #[test]
    fn test_parse_profile_rejects_empty_topics() {
        assert!(parse_profile(r#"{"topics": [], "summary": "s"}"#, "v", 1, 8).is_none());
        assert!(parse_profile("not json at all", "v", 1, 8).is_none());
    }
}
