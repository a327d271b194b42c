//! 意图识别模块
//!
//! 两级分类，结果一定落在候选路由键或 "general" 之内：
//! 1. 快速规则匹配：关键词命中且只命中一个候选键时直接返回，不调用 LLM
//! 2. LLM 语义分类：无命中或多键命中时调用 LLM，限定只能回答候选键之一；
//!    服务出错、超时或回答越界时降级为 "general" 并记录 classification_fallback 事件

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::agents::{preview, GENERAL_KEY, MAP_KEY, MUSIC_KEY};
use crate::core::{ClassificationFailure, RouteSource};
use crate::llm::{LlmClient, Message};
use crate::observability::TelemetryStore;

pub const DEFAULT_SEMANTIC_TIMEOUT: Duration = Duration::from_secs(30);

/// 分类结果：路由键及其来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub key: String,
    pub source: RouteSource,
}

impl Classification {
    fn new(key: impl Into<String>, source: RouteSource) -> Self {
        Self {
            key: key.into(),
            source,
        }
    }
}

/// 快速匹配结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastMatch {
    /// 无关键词命中
    NoMatch,
    /// 恰好命中一个候选键
    Single(String),
    /// 命中多个候选键，交给语义分类
    Ambiguous(Vec<String>),
}

/// 内置关键词表
pub fn default_keywords() -> Vec<(String, Vec<String>)> {
    let map = [
        "位置", "地址", "在哪", "哪里", "导航", "路线", "怎么走", "怎么去", "地图", "附近",
        "驾车", "步行", "公交", "距离", "经纬度", "navigate", "route", "map",
    ];
    let music = [
        "播放", "歌曲", "音乐", "听歌", "首歌", "歌手", "专辑", "暂停", "下一首", "切歌",
        "play", "song", "music",
    ];
    vec![
        (MAP_KEY.to_string(), map.iter().map(|s| s.to_string()).collect()),
        (MUSIC_KEY.to_string(), music.iter().map(|s| s.to_string()).collect()),
    ]
}

/// 意图分类器
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    telemetry: Arc<TelemetryStore>,
    /// 启用快速规则匹配（不调用 LLM）
    enable_fast_match: bool,
    keywords: Vec<(String, Vec<String>)>,
    descriptions: HashMap<String, String>,
    semantic_timeout: Option<Duration>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, telemetry: Arc<TelemetryStore>) -> Self {
        Self {
            llm,
            telemetry,
            enable_fast_match: true,
            keywords: default_keywords(),
            descriptions: HashMap::new(),
            semantic_timeout: Some(DEFAULT_SEMANTIC_TIMEOUT),
        }
    }

    pub fn with_fast_match(mut self, enable: bool) -> Self {
        self.enable_fast_match = enable;
        self
    }

    /// 替换（或新增）某个路由键的触发词
    pub fn with_keywords(mut self, key: impl Into<String>, triggers: Vec<String>) -> Self {
        let key = key.into();
        let triggers: Vec<String> = triggers.into_iter().map(|t| t.to_lowercase()).collect();
        match self.keywords.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = triggers,
            None => self.keywords.push((key, triggers)),
        }
        self
    }

    /// 路由键的能力描述，写入语义分类提示词
    pub fn with_descriptions(mut self, descriptions: impl IntoIterator<Item = (String, String)>) -> Self {
        self.descriptions.extend(descriptions);
        self
    }

    /// None 表示不限时
    pub fn with_semantic_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.semantic_timeout = timeout;
        self
    }

    /// 识别用户意图，返回的 key 一定属于 candidates ∪ {"general"}
    pub async fn classify(&self, text: &str, candidates: &[String]) -> Classification {
        if self.enable_fast_match {
            match self.fast_match(text, candidates) {
                FastMatch::Single(key) => {
                    tracing::debug!(key = %key, "fast path match");
                    return Classification::new(key, RouteSource::FastPath);
                }
                FastMatch::Ambiguous(keys) => {
                    tracing::debug!(?keys, "ambiguous fast path match, asking LLM");
                }
                FastMatch::NoMatch => {}
            }
        }

        match self.semantic(text, candidates).await {
            Ok(key) => Classification::new(key, RouteSource::Semantic),
            Err(failure) => {
                tracing::warn!(reason = %failure, "intent classification failed, falling back to general");
                self.telemetry.record_event(
                    "classification_fallback",
                    json!({
                        "reason": failure.to_string(),
                        "input": preview(text),
                    }),
                );
                Classification::new(GENERAL_KEY, RouteSource::Fallback)
            }
        }
    }

    /// 快速规则匹配（不调用 LLM）；只统计属于 candidates 的路由键
    pub fn fast_match(&self, text: &str, candidates: &[String]) -> FastMatch {
        let input_lower = text.to_lowercase();
        let matched: Vec<String> = self
            .keywords
            .iter()
            .filter(|(key, _)| candidates.iter().any(|c| c == key))
            .filter(|(_, triggers)| triggers.iter().any(|t| input_lower.contains(t.as_str())))
            .map(|(key, _)| key.clone())
            .collect();

        match matched.len() {
            0 => FastMatch::NoMatch,
            1 => FastMatch::Single(matched.into_iter().next().unwrap_or_default()),
            _ => FastMatch::Ambiguous(matched),
        }
    }

    /// 使用 LLM 在封闭集合内分类
    async fn semantic(&self, text: &str, candidates: &[String]) -> Result<String, ClassificationFailure> {
        let choices = closed_set(candidates);
        let messages = vec![
            Message::system(self.classification_prompt(candidates, &choices)),
            Message::user(format!("用户输入: {}", text)),
        ];

        let call = self.llm.complete_with_choices(&messages, &choices);
        let response = match self.semantic_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ClassificationFailure::Timeout(limit))??,
            None => call.await?,
        };

        let answer = normalize_answer(&response);
        if choices.iter().any(|c| *c == answer) {
            Ok(answer)
        } else {
            Err(ClassificationFailure::OutOfRange(preview(response.trim())))
        }
    }

    fn classification_prompt(&self, candidates: &[String], choices: &[String]) -> String {
        let mut lines = Vec::with_capacity(candidates.len() + 1);
        for key in candidates {
            let desc = self
                .descriptions
                .get(key)
                .map(String::as_str)
                .unwrap_or("专业任务");
            lines.push(format!("- {}: {}", key, desc));
        }
        lines.push(format!("- {}: 其他一般性对话或无法分类的任务", GENERAL_KEY));

        format!(
            "你是一个任务分类助手。根据用户的输入，判断应该使用哪个专业Agent来处理。\n\n\
             可用的Agent类型：\n{}\n\n\
             请只返回Agent类型（{}），不要返回其他内容。",
            lines.join("\n"),
            choices.join("/")
        )
    }
}

/// 合法答案：候选路由键加上 general
fn closed_set(candidates: &[String]) -> Vec<String> {
    candidates
        .iter()
        .cloned()
        .chain(std::iter::once(GENERAL_KEY.to_string()))
        .collect()
}

/// 规范化 LLM 回答：去空白、转小写、去掉引号反引号与首尾标点
fn normalize_answer(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '.' | '。' | ',' | '，' | ':' | '：' | '*')
        })
        .to_lowercase()
}
