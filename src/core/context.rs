//! 分派上下文：一次引擎实例共享的历史与遥测存储
//!
//! 由构建器创建后显式传给分派器与分类器，不使用进程级全局状态；
//! 测试可各自创建独立的上下文。

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::HistoryStore;
use crate::observability::{TelemetryLimits, TelemetryStore};

#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub history: Arc<HistoryStore>,
    pub telemetry: Arc<TelemetryStore>,
}

impl DispatchContext {
    pub fn new(history_capacity: usize, limits: TelemetryLimits, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            history: Arc::new(HistoryStore::new(history_capacity)),
            telemetry: Arc::new(TelemetryStore::new(limits, export_dir)),
        }
    }
}
