//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Ollama / DeepSeek / Mock）实现 LlmClient::complete。
//! 意图分类与各 Agent 的内部推理都只依赖这个窄接口，测试时可替换为确定性的替身。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("LLM request timed out")]
    Timeout,
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 闭集完成：`choices` 是合法答案的全集。
    ///
    /// 默认实现只调用 complete（答案集合已写在提示词里）；支持约束输出的后端可以覆盖。
    /// 调用方仍需校验返回值是否在集合内。
    async fn complete_with_choices(
        &self,
        messages: &[Message],
        _choices: &[String],
    ) -> Result<String, LlmError> {
        self.complete(messages).await
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
