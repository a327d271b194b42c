//! 任务结果：每次分派恰好产生一个，创建后不可变
//!
//! 成功时 content 非空、error 为空；失败时 error 非空、content 为空。
//! 字段私有，只能通过 `TaskResult::success` / `TaskResult::failure` 构造。

use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Agent 未返回内容时的占位文本
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "(Agent 未返回内容)";

const MAX_ERROR_CHARS: usize = 500;

/// 路由键的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// 调用方显式指定
    Override,
    /// 关键词快速匹配
    FastPath,
    /// LLM 语义分类
    Semantic,
    /// 分类失败，降级为 general
    Fallback,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteSource::Override => "override",
            RouteSource::FastPath => "fast_path",
            RouteSource::Semantic => "semantic",
            RouteSource::Fallback => "fallback",
        }
    }
}

/// 结果元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: String,
    /// 执行耗时（秒），从调用 Agent 前到返回/失败后
    pub execution_time: f64,
    pub route: RouteSource,
    pub started_at: DateTime<Local>,
}

/// 标准化的任务结果
///
/// 反序列化经过 `TaskResultRepr` 校验，不满足成功/失败互斥的数据会被拒绝。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskResultRepr")]
pub struct TaskResult {
    success: bool,
    agent_type: String,
    content: String,
    error: Option<String>,
    metadata: TaskMetadata,
}

impl TaskResult {
    /// 成功结果；空白内容替换为占位文本
    pub fn success(agent_type: impl Into<String>, content: impl Into<String>, metadata: TaskMetadata) -> Self {
        let content = content.into();
        let content = if content.trim().is_empty() {
            EMPTY_CONTENT_PLACEHOLDER.to_string()
        } else {
            content
        };
        Self {
            success: true,
            agent_type: agent_type.into(),
            content,
            error: None,
            metadata,
        }
    }

    /// 失败结果；错误文本经过清洗且保证非空
    pub fn failure(agent_type: impl Into<String>, error: &str, metadata: TaskMetadata) -> Self {
        Self {
            success: false,
            agent_type: agent_type.into(),
            content: String::new(),
            error: Some(sanitize_error(error)),
            metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    pub fn task_id(&self) -> &str {
        &self.metadata.task_id
    }

    pub fn execution_time(&self) -> f64 {
        self.metadata.execution_time
    }
}

#[derive(Deserialize)]
struct TaskResultRepr {
    success: bool,
    agent_type: String,
    content: String,
    error: Option<String>,
    metadata: TaskMetadata,
}

impl TryFrom<TaskResultRepr> for TaskResult {
    type Error = String;

    fn try_from(raw: TaskResultRepr) -> Result<Self, Self::Error> {
        let error = raw.error.filter(|e| !e.is_empty());
        match (raw.success, error) {
            (true, None) if !raw.content.is_empty() => {
                Ok(TaskResult::success(raw.agent_type, raw.content, raw.metadata))
            }
            (false, Some(error)) if raw.content.is_empty() => {
                Ok(TaskResult::failure(raw.agent_type, &error, raw.metadata))
            }
            (true, _) => Err("successful result must have content and no error".to_string()),
            (false, _) => Err("failed result must have an error and no content".to_string()),
        }
    }
}

/// 遮盖 URL 查询串与错误文本中的凭据参数（key=、token= 等）
fn redact_secrets(text: &str) -> String {
    static SECRET_PARAM: OnceLock<Option<Regex>> = OnceLock::new();
    let re = SECRET_PARAM.get_or_init(|| {
        Regex::new(r"(?i)\b(key|api_?key|access_?token|token|secret)=[^&\s)]+").ok()
    });
    match re {
        Some(re) => re.replace_all(text, "${1}=***").into_owned(),
        None => text.to_string(),
    }
}

/// 错误文本清洗：遮盖凭据、折叠空白、去首尾空白、截断到 500 字符，空串替换为 "unknown error"
pub fn sanitize_error(raw: &str) -> String {
    let collapsed = redact_secrets(raw).split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "unknown error".to_string();
    }
    if collapsed.chars().count() > MAX_ERROR_CHARS {
        let mut truncated: String = collapsed.chars().take(MAX_ERROR_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TaskMetadata {
        TaskMetadata {
            task_id: "abcd1234".to_string(),
            execution_time: 0.5,
            route: RouteSource::FastPath,
            started_at: Local::now(),
        }
    }

    #[test]
    fn test_success_is_exclusive() {
        let r = TaskResult::success("map", "东方明珠位于浦东", meta());
        assert!(r.is_success());
        assert!(!r.content().is_empty());
        assert!(r.error().is_none());
        assert_eq!(r.agent_type(), "map");
        assert_eq!(r.task_id(), "abcd1234");
    }

    #[test]
    fn test_blank_content_uses_placeholder() {
        let r = TaskResult::success("music", "  \n", meta());
        assert_eq!(r.content(), EMPTY_CONTENT_PLACEHOLDER);
    }

    #[test]
    fn test_failure_is_exclusive() {
        let r = TaskResult::failure("map", "Service error: timeout", meta());
        assert!(!r.is_success());
        assert!(r.content().is_empty());
        assert_eq!(r.error(), Some("Service error: timeout"));
    }

    #[test]
    fn test_failure_with_empty_error_is_not_empty() {
        let r = TaskResult::failure("map", "   ", meta());
        assert_eq!(r.error(), Some("unknown error"));
    }

    #[test]
    fn test_sanitize_collapses_and_truncates() {
        assert_eq!(sanitize_error("  a\n\tb   c "), "a b c");
        let long = "错".repeat(800);
        let cleaned = sanitize_error(&long);
        assert_eq!(cleaned.chars().count(), 503);
        assert!(cleaned.ends_with("..."));
    }

    #[test]
    fn test_sanitize_masks_credentials() {
        let raw = "error sending request for url (http://127.0.0.1:9/v3/place/text?keywords=x&key=SECRETKEY123&page=1)";
        let cleaned = sanitize_error(raw);
        assert!(!cleaned.contains("SECRETKEY123"));
        assert!(cleaned.contains("key=***&page=1"));
        assert_eq!(sanitize_error("monkey business"), "monkey business");
    }

    #[test]
    fn test_deserialize_rejects_mixed_result() {
        let ok = serde_json::to_value(TaskResult::success("map", "到了", meta())).unwrap();
        let parsed: TaskResult = serde_json::from_value(ok.clone()).unwrap();
        assert_eq!(parsed.content(), "到了");

        let mut mixed = ok;
        mixed["error"] = serde_json::json!("boom");
        assert!(serde_json::from_value::<TaskResult>(mixed).is_err());

        let mut empty_failure = serde_json::to_value(TaskResult::failure("map", "x", meta())).unwrap();
        empty_failure["error"] = serde_json::Value::Null;
        assert!(serde_json::from_value::<TaskResult>(empty_failure).is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let r = TaskResult::failure("music", "boom", meta());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["agent_type"], "music");
        assert_eq!(v["content"], "");
        assert_eq!(v["error"], "boom");
        assert_eq!(v["metadata"]["route"], "fast_path");
        assert_eq!(v["metadata"]["task_id"], "abcd1234");
    }
}
