//! 错误类型
//!
//! - RegistryError：注册表冲突或未知的路由键（调用方错误，直接上抛）
//! - AgentError：Agent 执行失败（在分派边界被捕获并打包进失败的 TaskResult）
//! - TelemetryError：遥测导出失败（仅 export 的调用方可见）

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 注册表错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Agent already registered: {0}")]
    DuplicateKey(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),
}

/// Agent 执行过程中的失败；分派器只把它当作不透明的错误文本
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

/// 遥测导出错误
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Telemetry export I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telemetry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid export file name: {0:?}")]
    InvalidFileName(String),
}

/// 意图分类失败（在分类器内部被降级为 general，不会传到调用方）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationFailure {
    #[error("classification service failed: {0}")]
    Service(#[from] LlmError),

    #[error("classification timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("classification answer out of range: {0}")]
    OutOfRange(String),
}
