//! Ollama 客户端
//!
//! Ollama 在 `/v1` 下暴露 OpenAI 兼容接口，直接复用 OpenAiClient。
//! 模型名允许带 `ollama/` 前缀（如 `ollama/deepseek-v3.1:671b-cloud`），创建时会去掉。

use crate::llm::OpenAiClient;

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const OLLAMA_DEFAULT_MODEL: &str = "deepseek-v3.1:671b-cloud";

/// 创建 Ollama 客户端；base_url 为服务根地址（不含 /v1）
pub fn create_ollama_client(base_url: Option<&str>, model: Option<&str>) -> OpenAiClient {
    let base = base_url.unwrap_or(OLLAMA_BASE_URL).trim_end_matches('/');
    let api_base = format!("{}/v1", base);
    let model = normalize_model_name(model.unwrap_or(OLLAMA_DEFAULT_MODEL));
    // Ollama 不校验 key，但 OpenAI 兼容层要求非空
    OpenAiClient::new(Some(&api_base), model, Some("ollama"))
}

fn normalize_model_name(model: &str) -> &str {
    model.strip_prefix("ollama/").unwrap_or(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(normalize_model_name("ollama/qwen2.5:7b"), "qwen2.5:7b");
        assert_eq!(normalize_model_name("qwen2.5:7b"), "qwen2.5:7b");
    }

    #[test]
    fn test_create_ollama_client_strips_prefix() {
        let client = create_ollama_client(Some("http://127.0.0.1:11434/"), Some("ollama/llama3"));
        assert_eq!(client.model(), "llama3");
    }
}
