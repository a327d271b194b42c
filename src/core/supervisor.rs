//! Supervisor：对外暴露的操作面
//!
//! 执行任务、查询历史与统计、读取遥测、导出快照。
//! 所有方法都是 `&self`，可被多个前端（REPL / HTTP）并发调用。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::{
    DispatchContext, Dispatcher, HistoryRecord, RegistryError, TaskResult, TaskStatistics,
    TelemetryError,
};
use crate::observability::{Event, MetricSample, TelemetrySummary, Trace};

/// 已注册 Agent 的展示信息
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AgentInfo {
    pub key: String,
    pub label: String,
    pub description: String,
}

pub struct Supervisor {
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor").finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    fn context(&self) -> &DispatchContext {
        self.dispatcher.context()
    }

    /// 执行一个任务；`agent_type` 指定时跳过意图分类。
    ///
    /// 只有未知的 `agent_type` 返回 Err，其余失败都体现在 TaskResult 中。
    pub async fn execute_task(
        &self,
        user_input: &str,
        agent_type: Option<&str>,
    ) -> Result<TaskResult, RegistryError> {
        self.dispatcher.execute(user_input, agent_type).await
    }

    /// 最近 limit 条历史，按时间从旧到新
    pub fn get_task_history(&self, limit: usize) -> Vec<HistoryRecord> {
        self.context().history.query(limit)
    }

    pub fn get_statistics(&self) -> TaskStatistics {
        self.context().history.statistics()
    }

    pub fn get_traces(&self, task_id: Option<&str>) -> Vec<Trace> {
        self.context().telemetry.traces(task_id)
    }

    pub fn get_events(&self, event_type: Option<&str>) -> Vec<Event> {
        self.context().telemetry.events(event_type)
    }

    pub fn get_metrics(&self, name: Option<&str>) -> BTreeMap<String, Vec<MetricSample>> {
        self.context().telemetry.metrics(name)
    }

    pub fn telemetry_summary(&self) -> TelemetrySummary {
        self.context().telemetry.summary()
    }

    /// 导出遥测快照，返回写入的文件路径
    pub fn export_to_file(&self, path: Option<&Path>) -> Result<PathBuf, TelemetryError> {
        self.context().telemetry.export_snapshot(path)
    }

    /// 按文件名导出到配置的导出目录；拒绝带目录的名称
    pub fn export_named(&self, file_name: Option<&str>) -> Result<PathBuf, TelemetryError> {
        self.context().telemetry.export_named(file_name)
    }

    /// 已注册的领域 Agent（不含默认对话处理器）
    pub fn agents(&self) -> Vec<AgentInfo> {
        let registry = self.dispatcher.registry();
        registry
            .keys()
            .into_iter()
            .filter_map(|key| registry.resolve(&key).ok())
            .map(|d| AgentInfo {
                key: d.key.clone(),
                label: d.label.clone(),
                description: d.description.clone(),
            })
            .collect()
    }
}
