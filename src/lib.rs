//! Hive - 多 Agent 路由与分发引擎
//!
//! 模块划分：
//! - **agents**: Agent trait、注册表与领域 Agent（地图 / 音乐 / 通用对话）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 结果模型、意图识别、分派器、任务历史、对外操作面与构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Ollama / DeepSeek / Mock）
//! - **observability**: 日志初始化与遥测存储（追踪 / 事件 / 指标）
//! - **services**: 外部能力（高德地图 REST、浏览器音乐播放）

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod services;

pub use crate::core::{EngineBuilder, Supervisor, TaskResult};
