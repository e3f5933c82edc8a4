//! 意图识别：注入检测与 handle 提取
//!
//! 两个正则级联，都在进入推理引擎之前运行：
//! - 注入检测命中任意一条模式即触发固定拒绝回复（硬边界，不依赖提示词约束）
//! - handle 提取按顺序尝试模式，首个命中者胜出，返回归一化后的 handle

use regex::Regex;

/// 注入检测器：角色覆盖、系统提示词套取与已知越狱 token
pub struct InjectionDetector {
    patterns: Vec<Regex>,
}

impl InjectionDetector {
    pub fn new() -> Self {
        let sources = [
            r"(?i)ignore\s+(?:all\s+|any\s+)?(?:previous|prior|above|your|the)\s+instructions",
            r"(?i)disregard\s+(?:all\s+|any\s+)?(?:previous|prior|your|the)\s+(?:instructions|rules|prompts?)",
            r"(?i)forget\s+(?:all\s+|everything\s+)?(?:your|the)\s+(?:instructions|rules)",
            r"(?i)you\s+are\s+now\s+(?:a|an|in)\b",
            r"(?i)pretend\s+(?:to\s+be|you\s+are)",
            r"(?i)act\s+as\s+(?:if\s+you|a\s+different|an?\s+unrestricted)",
            r"(?i)(?:reveal|show|print|repeat|output|display)\s+(?:me\s+)?(?:your|the)\s+(?:system\s+)?(?:prompt|instructions)",
            r"(?i)\bsystem\s+prompt\b",
            r"(?i)\bjailbreak",
            r"(?i)\bdan\s+mode\b",
            r"(?i)\bdeveloper\s+mode\b",
            r"(?i)new\s+instructions?\s*:",
        ];
        Self {
            patterns: compile_all(&sources),
        }
    }

    /// 命中任意模式即判定为注入
    pub fn is_injection(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

impl Default for InjectionDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// handle 提取器：有序模式列表，首个命中者胜出
///
/// 顺序：URL 式引用 > 带上下文关键词的「my X is Y」> 短纠正句（整句匹配）。
/// 关键词门槛避免把普通 @ 提及误判为分析请求。
pub struct HandleExtractor {
    patterns: Vec<Regex>,
}

impl HandleExtractor {
    pub fn new() -> Self {
        let sources = [
            // x.com/vitalik、warpcast.com/@dwr 等
            r"(?i)(?:x\.com|twitter\.com|warpcast\.com|farcaster\.xyz)/@?([A-Za-z0-9_.\-]+)",
            // my handle is vitalik / my twitter username: @vitalik
            r"(?i)my\s+(?:(?:x|twitter|farcaster|warpcast|social)\s+)?(?:handle|username|account|profile)\s*(?:is|[:;])\s*@?([A-Za-z0-9_.\-]+)",
            // it's actually vitalik / try @vitalik（整句，避免普通叙述误触）
            r"(?i)^\s*(?:no,?\s+)?(?:it'?s\s+actually|actually\s+it'?s|try)\s+@?([A-Za-z0-9_.\-]+)[.!]?\s*$",
        ];
        Self {
            patterns: compile_all(&sources),
        }
    }

    /// 提取首个命中的 handle，归一化后返回；无命中返回 None
    pub fn extract(&self, text: &str) -> Option<String> {
        for pattern in &self.patterns {
            if let Some(caps) = pattern.captures(text) {
                if let Some(m) = caps.get(1) {
                    let handle = normalize_handle(m.as_str());
                    if !handle.is_empty() {
                        return Some(handle);
                    }
                }
            }
        }
        None
    }
}

impl Default for HandleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_all(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .filter_map(|s| match Regex::new(s) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::error!(pattern = s, "invalid intent pattern: {}", e);
                None
            }
        })
        .collect()
}

/// 归一化：去掉前导 @、尾随标点，转小写
fn normalize_handle(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('@')
        .trim_end_matches(&['.', ',', '!', '?'][..])
        .to_lowercase()
}
