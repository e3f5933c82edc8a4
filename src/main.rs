//! Docent - Rust 会议议程助理
//!
//! 入口：初始化日志与配置，装配目录 / 工具 / LLM / 后台引擎 / 控制器，
//! 运行本地 REPL（一个本地会话 + 一条打印推送事件的活动连接）。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docent::catalog::{sample_agenda, Catalog, CatalogSource, FeedSource, StaticSource};
use docent::config::load_config;
use docent::controller::SessionController;
use docent::llm::{LlmClient, MockLlmClient, OpenAiClient};
use docent::scrape::{HttpScrapeProvider, MockScrapeProvider, ScrapeProvider};
use docent::store::{SessionDb, SessionStore};
use docent::task::{AnalysisConfig, AnalysisEngine};
use docent::tools::{
    AgendaInfoTool, ExportTool, SearchSessionsTool, SessionDetailsTool, ToolRegistry,
};

/// 本地 REPL 的会话键
const LOCAL_SESSION: &str = "local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let config = load_config(None).context("Failed to load config")?;

    // LLM 后端
    let llm: Arc<dyn LlmClient> = match config.llm.provider.as_str() {
        "mock" => Arc::new(MockLlmClient::new()),
        _ => Arc::new(OpenAiClient::new(
            config.llm.base_url.as_deref(),
            &config.llm.model,
            None,
        )),
    };

    // 议程目录：未配置 feed_url 时用内置示例议程
    let source: Arc<dyn CatalogSource> = match &config.catalog.feed_url {
        Some(url) => Arc::new(FeedSource::new(url, config.catalog.fetch_timeout_secs)),
        None => {
            tracing::info!("no agenda feed configured, using the built-in sample agenda");
            Arc::new(StaticSource::new(sample_agenda()))
        }
    };
    let catalog = Arc::new(Catalog::new(
        source,
        Duration::from_secs(config.catalog.cache_ttl_secs),
    ));

    // 抓取服务：未配置 base_url 时用带演示数据的 Mock
    let scraper: Arc<dyn ScrapeProvider> = match &config.scrape.base_url {
        Some(url) => Arc::new(HttpScrapeProvider::new(url, config.scrape.timeout_secs)),
        None => {
            tracing::info!("no scrape service configured, using the demo provider");
            Arc::new(MockScrapeProvider::new().with_posts(
                "vitalik",
                vec![
                    "zk rollups are still underrated",
                    "thinking about quadratic funding again",
                    "defi needs better risk models",
                ],
            ))
        }
    };

    // 会话存储（可选持久化）
    let store = match &config.app.db_path {
        Some(path) => {
            let db = SessionDb::open(path)
                .with_context(|| format!("Failed to open session db at {}", path.display()))?;
            Arc::new(SessionStore::with_persistence(db).context("Failed to restore sessions")?)
        }
        None => Arc::new(SessionStore::new()),
    };

    // 工具箱
    let mut tools = ToolRegistry::new();
    tools.register(SearchSessionsTool::new(Arc::clone(&catalog)));
    tools.register(SessionDetailsTool::new(Arc::clone(&catalog)));
    tools.register(AgendaInfoTool::new(Arc::clone(&catalog)));
    tools.register(ExportTool::new(Arc::clone(&catalog)));

    // 后台引擎与控制器
    let analysis = AnalysisConfig::from_section(&config.analysis, config.scrape.max_posts);
    let (engine, events_rx) = AnalysisEngine::new(
        Arc::clone(&scraper),
        Arc::clone(&llm),
        Arc::clone(&store),
        analysis,
    );
    let controller = Arc::new(SessionController::new(
        Arc::clone(&store),
        llm,
        Arc::new(tools),
        engine,
        config.controller.max_tool_rounds,
    ));
    Arc::clone(&controller).spawn_event_pump(events_rx);

    // 活动连接：把后台推送事件打印到终端
    let (push_tx, mut push_rx) = mpsc::unbounded_channel();
    store.add_sink(LOCAL_SESSION, "repl", push_tx).await;
    tokio::spawn(async move {
        while let Some(event) = push_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("\n[update] {}", json),
                Err(e) => tracing::warn!("failed to render push event: {}", e),
            }
        }
    });

    println!("Docent ready. Ask about the agenda; /clear resets the session, /quit exits.");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    loop {
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "/quit" | "/exit" => break,
            "/clear" => {
                store.clear(LOCAL_SESSION).await;
                println!("Session cleared.");
            }
            _ => match controller.handle_turn(LOCAL_SESSION, input).await {
                Ok(reply) => println!("{}", reply),
                Err(e) => {
                    tracing::error!("turn failed: {}", e);
                    println!("Something went wrong: {}", e);
                }
            },
        }
    }

    store.remove_sink(LOCAL_SESSION, "repl").await;
    Ok(())
}
