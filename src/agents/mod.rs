//! Agent：把文本变成文本的领域执行单元
//!
//! 所有 Agent 实现 Agent trait（key / label / description / execute），
//! 由 AgentRegistry 按路由键注册与查找；分派器只通过该 trait 调用。

pub mod general;
pub mod map;
pub mod music;
pub mod registry;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::core::AgentError;

pub use general::GeneralAgent;
pub use map::MapAgent;
pub use music::MusicAgent;
pub use registry::{AgentDescriptor, AgentRegistry};

/// 保留的兜底路由键：交给默认对话处理器
pub const GENERAL_KEY: &str = "general";
pub const MAP_KEY: &str = "map";
pub const MUSIC_KEY: &str = "music";

/// Agent trait：路由键、展示名、能力描述（供意图分类提示词使用）、异步执行
#[async_trait]
pub trait Agent: Send + Sync {
    /// 路由键（注册表内唯一）
    fn key(&self) -> &str;

    /// 人类可读名称
    fn label(&self) -> &str;

    /// 能力描述（供 LLM 分类时理解）
    fn description(&self) -> &str;

    /// 执行任务：输入原始用户文本，返回回复文本
    async fn execute(&self, input: &str) -> Result<String, AgentError>;
}

/// 从 LLM 回复中提取第一个 JSON 对象并反序列化（容忍 ```json 包裹与前后说明文字）
pub(crate) fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T, AgentError> {
    static OBJECT: OnceLock<Option<Regex>> = OnceLock::new();
    let re = OBJECT
        .get_or_init(|| Regex::new(r"(?s)\{.*\}").ok())
        .as_ref()
        .ok_or_else(|| AgentError::InvalidPlan("json pattern unavailable".to_string()))?;
    let raw = re
        .find(reply)
        .map(|m| m.as_str())
        .ok_or_else(|| AgentError::InvalidPlan(format!("no JSON object in reply: {}", preview(reply))))?;
    serde_json::from_str(raw)
        .map_err(|e| AgentError::InvalidPlan(format!("{} (reply: {})", e, preview(reply))))
}

/// 截断长文本用于日志与错误信息
pub(crate) fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Plan {
        action: String,
    }

    #[test]
    fn test_parse_json_reply_in_code_fence() {
        let reply = "好的，计划如下：\n```json\n{\"action\": \"search\"}\n```";
        let plan: Plan = parse_json_reply(reply).unwrap();
        assert_eq!(plan.action, "search");
    }

    #[test]
    fn test_parse_json_reply_without_object() {
        let err = parse_json_reply::<Plan>("I cannot help").unwrap_err();
        assert!(matches!(err, AgentError::InvalidPlan(_)));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "a".repeat(300);
        assert_eq!(preview(&long).len(), 123);
        assert_eq!(preview("short"), "short");
    }
}
