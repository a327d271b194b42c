//! 遥测存储
//!
//! 三条相互独立的有界日志：
//! - traces：一次分派内部各步骤的开始/结束（按 task_id 关联）
//! - events：离散的命名事件（如 classification_fallback、agent_failure）
//! - metrics：按名称区分的数值时间序列，每个序列独立限长
//!
//! 写入只在锁内做内存操作；查询在锁内复制快照后立即释放；导出在锁外序列化与写文件。

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::TelemetryError;
use crate::observability::{read_lock, write_lock, RingBuffer};

pub const DEFAULT_TRACE_CAPACITY: usize = 1000;
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;
pub const DEFAULT_METRIC_CAPACITY: usize = 1000;

/// 追踪阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracePhase {
    Start,
    End,
}

/// 一条追踪记录：某个内部步骤的开始或结束
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub task_id: String,
    pub span: String,
    pub phase: TracePhase,
    pub timestamp: DateTime<Local>,
    /// 仅 End 记录携带耗时（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub metadata: Value,
}

impl Trace {
    pub fn start(task_id: impl Into<String>, span: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            span: span.into(),
            phase: TracePhase::Start,
            timestamp: Local::now(),
            duration_ms: None,
            metadata: Value::Null,
        }
    }

    pub fn end(task_id: impl Into<String>, span: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            span: span.into(),
            phase: TracePhase::End,
            timestamp: Local::now(),
            duration_ms: Some(elapsed.as_secs_f64() * 1000.0),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// 离散事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub timestamp: DateTime<Local>,
    pub data: Value,
}

/// 指标样本
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub timestamp: DateTime<Local>,
}

/// 单个指标序列的统计摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// 遥测总体摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    pub total_traces: usize,
    pub total_events: usize,
    pub metrics_count: usize,
    pub metric_summary: BTreeMap<String, MetricSummary>,
}

/// 导出文件的内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub exported_at: DateTime<Local>,
    pub traces: Vec<Trace>,
    pub events: Vec<Event>,
    pub metrics: BTreeMap<String, Vec<MetricSample>>,
    pub statistics: TelemetrySummary,
}

/// 三条日志的容量上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryLimits {
    pub trace_capacity: usize,
    pub event_capacity: usize,
    /// 每个指标序列各自的上限
    pub metric_capacity: usize,
}

impl Default for TelemetryLimits {
    fn default() -> Self {
        Self {
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            metric_capacity: DEFAULT_METRIC_CAPACITY,
        }
    }
}

/// 遥测存储：traces / events / metrics 各自一把锁
#[derive(Debug)]
pub struct TelemetryStore {
    limits: TelemetryLimits,
    export_dir: PathBuf,
    traces: RwLock<RingBuffer<Trace>>,
    events: RwLock<RingBuffer<Event>>,
    metrics: RwLock<BTreeMap<String, RingBuffer<MetricSample>>>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(TelemetryLimits::default(), "logs")
    }
}

impl TelemetryStore {
    pub fn new(limits: TelemetryLimits, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            limits,
            export_dir: export_dir.into(),
            traces: RwLock::new(RingBuffer::new(limits.trace_capacity)),
            events: RwLock::new(RingBuffer::new(limits.event_capacity)),
            metrics: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn limits(&self) -> TelemetryLimits {
        self.limits
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn record_trace(&self, trace: Trace) {
        write_lock(&self.traces, "traces").push(trace);
    }

    /// 记录事件，并以结构化日志输出一份
    pub fn record_event(&self, event_type: impl Into<String>, data: Value) {
        let event = Event {
            event_type: event_type.into(),
            timestamp: Local::now(),
            data,
        };
        tracing::info!(event_type = %event.event_type, data = %event.data, "telemetry event");
        write_lock(&self.events, "events").push(event);
    }

    pub fn record_metric(&self, name: impl Into<String>, value: f64) {
        let sample = MetricSample {
            value,
            timestamp: Local::now(),
        };
        let capacity = self.limits.metric_capacity;
        write_lock(&self.metrics, "metrics")
            .entry(name.into())
            .or_insert_with(|| RingBuffer::new(capacity))
            .push(sample);
    }

    /// 当前窗口内的追踪；给定 task_id 时只返回该任务的记录
    pub fn traces(&self, task_id: Option<&str>) -> Vec<Trace> {
        let traces = read_lock(&self.traces, "traces");
        match task_id {
            Some(id) => traces.iter().filter(|t| t.task_id == id).cloned().collect(),
            None => traces.to_vec(),
        }
    }

    /// 当前窗口内的事件；给定 event_type 时按类型过滤
    pub fn events(&self, event_type: Option<&str>) -> Vec<Event> {
        let events = read_lock(&self.events, "events");
        match event_type {
            Some(kind) => events
                .iter()
                .filter(|e| e.event_type == kind)
                .cloned()
                .collect(),
            None => events.to_vec(),
        }
    }

    /// 指标序列；给定名称时只返回该序列（不存在则为空序列）
    pub fn metrics(&self, name: Option<&str>) -> BTreeMap<String, Vec<MetricSample>> {
        let metrics = read_lock(&self.metrics, "metrics");
        match name {
            Some(name) => {
                let series = metrics.get(name).map(RingBuffer::to_vec).unwrap_or_default();
                BTreeMap::from([(name.to_string(), series)])
            }
            None => metrics
                .iter()
                .map(|(k, v)| (k.clone(), v.to_vec()))
                .collect(),
        }
    }

    pub fn summary(&self) -> TelemetrySummary {
        let total_traces = read_lock(&self.traces, "traces").len();
        let total_events = read_lock(&self.events, "events").len();
        let metrics = read_lock(&self.metrics, "metrics");
        summary_of(total_traces, total_events, metrics.iter().map(|(k, v)| (k, v.iter())))
    }

    /// 复制三条日志的当前内容；statistics 由这份副本计算，与文件内容一致
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let traces = self.traces(None);
        let events = self.events(None);
        let metrics = self.metrics(None);
        let statistics = summary_of(
            traces.len(),
            events.len(),
            metrics.iter().map(|(k, v)| (k, v.iter())),
        );
        TelemetrySnapshot {
            exported_at: Local::now(),
            traces,
            events,
            metrics,
            statistics,
        }
    }

    /// 导出到 `export_dir` 下的指定文件名；只接受不含目录的文件名
    pub fn export_named(&self, file_name: Option<&str>) -> Result<PathBuf, TelemetryError> {
        match file_name {
            None => self.export_snapshot(None),
            Some(name) => {
                let path = self.export_dir.join(checked_file_name(name)?);
                self.export_snapshot(Some(&path))
            }
        }
    }

    /// 导出快照为 JSON 文件，返回实际写入的路径。
    ///
    /// 未指定路径时写到 `export_dir/observability_YYYYmmdd_HHMMSS.json`。
    /// 写入失败只返回错误，内存中的数据不受影响。
    pub fn export_snapshot(&self, path: Option<&Path>) -> Result<PathBuf, TelemetryError> {
        let snapshot = self.snapshot();
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => self.export_dir.join(format!(
                "observability_{}.json",
                snapshot.exported_at.format("%Y%m%d_%H%M%S")
            )),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&path, json)?;
        tracing::info!(path = %path.display(), "telemetry snapshot exported");
        Ok(path)
    }
}

fn summarize<'a>(series: impl Iterator<Item = &'a MetricSample>) -> Option<MetricSummary> {
    let (count, min, max, sum) = series.fold(
        (0usize, f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(count, min, max, sum), s| (count + 1, min.min(s.value), max.max(s.value), sum + s.value),
    );
    (count > 0).then(|| MetricSummary {
        count,
        min,
        max,
        avg: sum / count as f64,
    })
}

fn summary_of<'a, S>(
    total_traces: usize,
    total_events: usize,
    metrics: impl Iterator<Item = (&'a String, S)>,
) -> TelemetrySummary
where
    S: Iterator<Item = &'a MetricSample>,
{
    let mut metrics_count = 0;
    let mut metric_summary = BTreeMap::new();
    for (name, series) in metrics {
        metrics_count += 1;
        if let Some(summary) = summarize(series) {
            metric_summary.insert(name.clone(), summary);
        }
    }
    TelemetrySummary {
        total_traces,
        total_events,
        metrics_count,
        metric_summary,
    }
}

/// 文件名必须是单个普通路径段（无目录、无 `..`、非绝对路径）
fn checked_file_name(name: &str) -> Result<&str, TelemetryError> {
    let trimmed = name.trim();
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None)
            if part == trimmed && !trimmed.contains(['/', '\\']) =>
        {
            Ok(trimmed)
        }
        _ => Err(TelemetryError::InvalidFileName(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn small_store() -> TelemetryStore {
        TelemetryStore::new(
            TelemetryLimits {
                trace_capacity: 5,
                event_capacity: 3,
                metric_capacity: 4,
            },
            "logs",
        )
    }

    #[test]
    fn test_traces_are_bounded_and_filterable() {
        let store = small_store();
        for i in 0..8 {
            store.record_trace(Trace::start(format!("t{}", i % 2), "execute"));
        }
        assert_eq!(store.traces(None).len(), 5);
        assert_eq!(store.traces(Some("t1")).len(), 2);
        assert!(store.traces(Some("missing")).is_empty());
    }

    #[test]
    fn test_trace_end_carries_duration() {
        let trace = Trace::end("abc", "classify", Duration::from_millis(1500));
        assert_eq!(trace.phase, TracePhase::End);
        assert_eq!(trace.duration_ms, Some(1500.0));
        let start = Trace::start("abc", "classify").with_metadata(json!({"route": "override"}));
        assert_eq!(start.metadata["route"], "override");
        assert!(start.duration_ms.is_none());
    }

    #[test]
    fn test_events_evict_oldest_first() {
        let store = small_store();
        for i in 0..5 {
            store.record_event("agent_failure", json!({ "n": i }));
        }
        let events = store.events(None);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data["n"], 2);
        assert_eq!(events[2].data["n"], 4);
    }

    #[test]
    fn test_events_filter_by_type() {
        let store = small_store();
        store.record_event("agent_selection", json!({}));
        store.record_event("agent_failure", json!({}));
        assert_eq!(store.events(Some("agent_failure")).len(), 1);
        assert_eq!(store.events(Some("nope")).len(), 0);
    }

    #[test]
    fn test_metric_series_capped_independently() {
        let store = small_store();
        for i in 0..10 {
            store.record_metric("a", i as f64);
        }
        store.record_metric("b", 1.0);
        let all = store.metrics(None);
        assert_eq!(all["a"].len(), 4);
        assert_eq!(all["a"][0].value, 6.0);
        assert_eq!(all["b"].len(), 1);

        let only_b = store.metrics(Some("b"));
        assert_eq!(only_b.len(), 1);
        let missing = store.metrics(Some("zzz"));
        assert!(missing["zzz"].is_empty());
    }

    #[test]
    fn test_summary_min_max_avg() {
        let store = small_store();
        store.record_metric("latency", 1.0);
        store.record_metric("latency", 3.0);
        store.record_event("x", json!({}));
        let summary = store.summary();
        assert_eq!(summary.total_events, 1);
        assert_eq!(summary.metrics_count, 1);
        let m = &summary.metric_summary["latency"];
        assert_eq!((m.count, m.min, m.max, m.avg), (2, 1.0, 3.0, 2.0));
    }

    #[test]
    fn test_export_to_explicit_path() {
        let dir = TempDir::new().unwrap();
        let store = small_store();
        store.record_trace(Trace::start("t1", "execute"));
        store.record_event("agent_failure", json!({"error": "boom"}));
        store.record_metric("m", 2.5);

        let target = dir.path().join("nested").join("snap.json");
        let written = store.export_snapshot(Some(&target)).unwrap();
        assert_eq!(written, target);

        let raw = std::fs::read_to_string(&written).unwrap();
        let parsed: TelemetrySnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.traces.len(), 1);
        assert_eq!(parsed.events[0].event_type, "agent_failure");
        assert_eq!(parsed.metrics["m"][0].value, 2.5);
        assert_eq!(parsed.statistics.total_traces, 1);
    }

    #[test]
    fn test_snapshot_statistics_match_copied_logs() {
        let store = small_store();
        store.record_trace(Trace::start("t1", "execute"));
        store.record_metric("m", 1.0);
        store.record_metric("m", 3.0);
        let snap = store.snapshot();
        assert_eq!(snap.statistics.total_traces, snap.traces.len());
        assert_eq!(snap.statistics.total_events, snap.events.len());
        assert_eq!(snap.statistics.metrics_count, snap.metrics.len());
        assert_eq!(snap.statistics.metric_summary["m"].avg, 2.0);
    }

    #[test]
    fn test_export_named_stays_in_export_dir() {
        let dir = TempDir::new().unwrap();
        let store = TelemetryStore::new(TelemetryLimits::default(), dir.path().join("logs"));
        let written = store.export_named(Some("run1.json")).unwrap();
        assert_eq!(written, dir.path().join("logs").join("run1.json"));
        assert!(written.exists());

        for bad in ["../escape.json", "/tmp/abs.json", "a/b.json", "..", "", "  "] {
            let err = store.export_named(Some(bad)).unwrap_err();
            assert!(matches!(err, TelemetryError::InvalidFileName(_)), "{}", bad);
        }
        assert!(!dir.path().join("escape.json").exists());
    }

    #[test]
    fn test_export_default_path_uses_export_dir() {
        let dir = TempDir::new().unwrap();
        let store = TelemetryStore::new(TelemetryLimits::default(), dir.path().join("logs"));
        let written = store.export_snapshot(None).unwrap();
        assert!(written.starts_with(dir.path().join("logs")));
        let name = written.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("observability_") && name.ends_with(".json"));
    }

    #[test]
    fn test_export_failure_leaves_state_intact() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let store = small_store();
        store.record_event("agent_failure", json!({}));
        let result = store.export_snapshot(Some(&blocker.join("snap.json")));
        assert!(result.is_err());
        assert_eq!(store.events(None).len(), 1);
    }

    #[test]
    fn test_concurrent_writers_respect_capacity() {
        let store = std::sync::Arc::new(small_store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        store.record_trace(Trace::start(format!("{}-{}", i, j), "s"));
                        store.record_event("e", json!({}));
                        store.record_metric("m", j as f64);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.traces(None).len(), 5);
        assert_eq!(store.events(None).len(), 3);
        assert_eq!(store.metrics(Some("m"))["m"].len(), 4);
    }
}
