//! 核心路由层：结果模型、错误、任务历史、意图识别、分派与对外操作面

pub mod builder;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod intent;
pub mod result;
pub mod supervisor;

pub use builder::{create_llm_from_config, EngineBuilder};
pub use context::DispatchContext;
pub use dispatcher::{new_task_id, Dispatcher};
pub use error::{AgentError, ClassificationFailure, RegistryError, TelemetryError};
pub use history::{HistoryRecord, HistoryStore, TaskStatistics, DEFAULT_HISTORY_CAPACITY};
pub use intent::{default_keywords, Classification, FastMatch, IntentClassifier, DEFAULT_SEMANTIC_TIMEOUT};
pub use result::{sanitize_error, RouteSource, TaskMetadata, TaskResult, EMPTY_CONTENT_PLACEHOLDER};
pub use supervisor::{AgentInfo, Supervisor};
