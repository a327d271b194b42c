//! 通用对话 Agent：没有领域 Agent 适合时的兜底，直接交给 LLM 回答

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{Agent, GENERAL_KEY};
use crate::core::AgentError;
use crate::llm::{LlmClient, Message};

const GENERAL_SYSTEM_PROMPT: &str =
    "你是一个友好的中文助手。直接、简洁地回答用户的问题；如果问题涉及地图导航或音乐播放，可以提示用户换个说法。";

pub struct GeneralAgent {
    llm: Arc<dyn LlmClient>,
}

impl GeneralAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Agent for GeneralAgent {
    fn key(&self) -> &str {
        GENERAL_KEY
    }

    fn label(&self) -> &str {
        "通用对话"
    }

    fn description(&self) -> &str {
        "闲聊、常识问答等不属于其他领域的请求"
    }

    async fn execute(&self, input: &str) -> Result<String, AgentError> {
        let messages = [Message::system(GENERAL_SYSTEM_PROMPT), Message::user(input)];
        Ok(self.llm.complete(&messages).await?)
    }
}
