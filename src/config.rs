//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DOCENT__*` 覆盖（双下划线表示嵌套，如 `DOCENT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub scrape: ScrapeSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub controller: ControllerSection,
}

/// [app] 段：应用名、SQLite 路径
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话持久化数据库路径；未设置时仅用内存存储
    pub db_path: Option<PathBuf>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai（任意兼容端点） / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            request_timeout_secs: 60,
        }
    }
}

/// [catalog] 段：议程数据源与缓存
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// 议程 JSON 数据源 URL；未设置时用内置示例议程
    pub feed_url: Option<String>,
    /// 读穿缓存的保鲜窗口（秒）
    pub cache_ttl_secs: u64,
    /// 数据源请求超时（秒）
    pub fetch_timeout_secs: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            feed_url: None,
            cache_ttl_secs: 300,
            fetch_timeout_secs: 15,
        }
    }
}

/// [scrape] 段：画像抓取服务
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeSection {
    pub base_url: Option<String>,
    /// 单个 subject 最多抓取的帖子数
    pub max_posts: usize,
    pub timeout_secs: u64,
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            base_url: None,
            max_posts: 50,
            timeout_secs: 30,
        }
    }
}

/// [analysis] 段：后台分析各步骤的重试策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    pub fetch_max_attempts: u32,
    pub fetch_base_delay_secs: u64,
    pub fetch_timeout_secs: u64,
    pub summarize_max_attempts: u32,
    pub summarize_base_delay_secs: u64,
    pub summarize_timeout_secs: u64,
    /// 退避倍率（每次失败后延迟乘以该倍率）
    pub backoff_multiplier: u32,
    /// 画像主题条数上限
    pub max_topics: usize,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            fetch_max_attempts: 3,
            fetch_base_delay_secs: 5,
            fetch_timeout_secs: 300,
            summarize_max_attempts: 2,
            summarize_base_delay_secs: 3,
            summarize_timeout_secs: 120,
            backoff_multiplier: 2,
            max_topics: 8,
        }
    }
}

/// [controller] 段：推理轮次限制
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    /// 单轮对话内最大工具调用回合数，防止死循环
    pub max_tool_rounds: usize,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self { max_tool_rounds: 6 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            catalog: CatalogSection::default(),
            scrape: ScrapeSection::default(),
            analysis: AnalysisSection::default(),
            controller: ControllerSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 DOCENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DOCENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DOCENT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置（配置热更新：调用方决定是否用新配置重建组件）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
