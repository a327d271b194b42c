//! DeepSeek 客户端（OpenAI 兼容接口，Base URL: https://api.deepseek.com）

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 从环境变量读取 Key（DEEPSEEK_API_KEY 优先，其次 OPENAI_API_KEY）
pub fn deepseek_api_key() -> Option<String> {
    ["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]
        .into_iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|k| !k.trim().is_empty())
}

/// 创建 DeepSeek 客户端；没有可用 Key 时返回 None，由调用方决定降级
///
/// 模型未指定时依次使用 `DEEPSEEK_MODEL` 环境变量与 deepseek-chat。
/// 分类与计划提取需要稳定输出，推理模型 deepseek-reasoner 不建议用于路由。
pub fn create_deepseek_client(model: Option<&str>, api_key: Option<String>) -> Option<OpenAiClient> {
    let api_key = api_key.filter(|k| !k.trim().is_empty()).or_else(deepseek_api_key)?;
    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
    Some(OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, Some(&api_key)))
}
