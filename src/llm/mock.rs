//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! - `MockLlmClient`：回显最后一条 User 消息，便于本地跑通分派流程
//! - `ScriptedLlmClient`：按顺序返回预设回复，并记录调用，供确定性测试使用

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{last_user_content, LlmClient, LlmError, Message};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = last_user_content(messages).unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 脚本化客户端：每次 complete 弹出一条预设回复；脚本耗尽后返回 fallback（未设置则报错）
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<Result<String, LlmError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Vec<Message>>>,
    choice_sets: Mutex<Vec<Vec<String>>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条成功回复
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    /// 追加一条失败回复
    pub fn fail(self, err: LlmError) -> Self {
        self.push(Err(err))
    }

    /// 脚本耗尽后始终返回该结果
    pub fn otherwise(mut self, result: Result<String, LlmError>) -> Self {
        self.fallback = Some(result);
        self
    }

    /// 每次调用前等待（模拟慢速服务）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, result: Result<String, LlmError>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
        self
    }

    /// 累计调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的消息
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 闭集调用收到的答案集合
    pub fn choice_sets(&self) -> Vec<Vec<String>> {
        self.choice_sets.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(result) => result,
            None => self
                .fallback
                .clone()
                .unwrap_or_else(|| Err(LlmError::Request("script exhausted".to_string()))),
        }
    }

    async fn complete_with_choices(
        &self,
        messages: &[Message],
        choices: &[String],
    ) -> Result<String, LlmError> {
        self.choice_sets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(choices.to_vec());
        self.complete(messages).await
    }
}
