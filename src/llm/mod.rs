//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Ollama / DeepSeek / Mock）

pub mod deepseek;
pub mod message;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

pub use deepseek::{
    create_deepseek_client, deepseek_api_key, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, DEEPSEEK_REASONER,
};
pub use message::{last_user_content, Message, Role};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use ollama::{create_ollama_client, OLLAMA_BASE_URL, OLLAMA_DEFAULT_MODEL};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};
