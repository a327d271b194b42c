//! 任务历史
//!
//! 保留最近 N 次分派（默认 100）的决策与结果，超出时淘汰最旧记录。
//! 统计信息每次从当前窗口现算，不单独存储。

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::TaskResult;
use crate::observability::{read_lock, write_lock, RingBuffer};

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// 一次分派的历史记录，追加后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub task_id: String,
    pub timestamp: DateTime<Local>,
    pub user_input: String,
    pub agent_type: String,
    pub success: bool,
    pub execution_time: f64,
    pub result: TaskResult,
}

impl HistoryRecord {
    pub fn new(user_input: impl Into<String>, result: TaskResult) -> Self {
        Self {
            task_id: result.task_id().to_string(),
            timestamp: Local::now(),
            user_input: user_input.into(),
            agent_type: result.agent_type().to_string(),
            success: result.is_success(),
            execution_time: result.execution_time(),
            result,
        }
    }
}

/// 当前窗口的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub total_tasks: usize,
    /// 成功数 / 总数；窗口为空时为 0
    pub success_rate: f64,
    /// 成功与失败一并计入的平均耗时（秒）
    pub avg_execution_time: f64,
    pub agent_usage: BTreeMap<String, usize>,
}

/// 有界任务历史
#[derive(Debug)]
pub struct HistoryStore {
    records: RwLock<RingBuffer<HistoryRecord>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(RingBuffer::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        read_lock(&self.records, "history").capacity()
    }

    pub fn append(&self, record: HistoryRecord) {
        let evicted = write_lock(&self.records, "history").push(record);
        if let Some(old) = evicted {
            tracing::debug!(task_id = %old.task_id, "history full, evicted oldest record");
        }
    }

    /// 最近 limit 条记录，按时间从旧到新排列
    pub fn query(&self, limit: usize) -> Vec<HistoryRecord> {
        read_lock(&self.records, "history").latest(limit)
    }

    pub fn len(&self) -> usize {
        read_lock(&self.records, "history").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn statistics(&self) -> TaskStatistics {
        let records = read_lock(&self.records, "history").to_vec();
        compute_statistics(&records)
    }
}

fn compute_statistics(records: &[HistoryRecord]) -> TaskStatistics {
    let total = records.len();
    if total == 0 {
        return TaskStatistics {
            total_tasks: 0,
            success_rate: 0.0,
            avg_execution_time: 0.0,
            agent_usage: BTreeMap::new(),
        };
    }

    let successes = records.iter().filter(|r| r.success).count();
    let total_time: f64 = records.iter().map(|r| r.execution_time).sum();
    let mut agent_usage = BTreeMap::new();
    for r in records {
        *agent_usage.entry(r.agent_type.clone()).or_insert(0) += 1;
    }

    TaskStatistics {
        total_tasks: total,
        success_rate: successes as f64 / total as f64,
        avg_execution_time: total_time / total as f64,
        agent_usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RouteSource, TaskMetadata};
    use std::sync::Arc;

    fn record(n: usize, agent: &str, ok: bool, secs: f64) -> HistoryRecord {
        let meta = TaskMetadata {
            task_id: format!("task{}", n),
            execution_time: secs,
            route: RouteSource::FastPath,
            started_at: Local::now(),
        };
        let result = if ok {
            TaskResult::success(agent, "done", meta)
        } else {
            TaskResult::failure(agent, "boom", meta)
        };
        HistoryRecord::new(format!("input {}", n), result)
    }

    #[test]
    fn test_empty_statistics_are_zero() {
        let store = HistoryStore::default();
        let stats = store.statistics();
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_execution_time, 0.0);
        assert!(stats.agent_usage.is_empty());
    }

    #[test]
    fn test_history_bound_keeps_most_recent() {
        let store = HistoryStore::default();
        for n in 0..101 {
            store.append(record(n, "map", true, 0.1));
        }
        let all = store.query(1000);
        assert_eq!(all.len(), 100);
        assert_eq!(all[0].task_id, "task1");
        assert_eq!(all[99].task_id, "task100");
        assert!(all.iter().all(|r| r.task_id != "task0"));
    }

    #[test]
    fn test_query_limit_returns_latest_oldest_first() {
        let store = HistoryStore::new(10);
        for n in 0..5 {
            store.append(record(n, "map", true, 0.1));
        }
        let latest: Vec<_> = store.query(2).into_iter().map(|r| r.task_id).collect();
        assert_eq!(latest, vec!["task3", "task4"]);
        assert!(store.query(0).is_empty());
    }

    #[test]
    fn test_statistics_over_window() {
        let store = HistoryStore::default();
        store.append(record(0, "map", true, 1.0));
        store.append(record(1, "map", false, 2.0));
        store.append(record(2, "music", true, 3.0));
        store.append(record(3, "general", true, 2.0));

        let stats = store.statistics();
        assert_eq!(stats.total_tasks, 4);
        assert!((stats.success_rate - 0.75).abs() < 1e-9);
        assert!((stats.avg_execution_time - 2.0).abs() < 1e-9);
        assert_eq!(stats.agent_usage["map"], 2);
        assert_eq!(stats.agent_usage["music"], 1);
        assert_eq!(stats.agent_usage["general"], 1);
    }

    #[test]
    fn test_statistics_ignore_evicted_records() {
        let store = HistoryStore::new(2);
        store.append(record(0, "map", false, 10.0));
        store.append(record(1, "music", true, 1.0));
        store.append(record(2, "music", true, 1.0));
        let stats = store.statistics();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.success_rate, 1.0);
        assert!(!stats.agent_usage.contains_key("map"));
    }

    #[test]
    fn test_concurrent_appends_stay_bounded_and_consistent() {
        let store = Arc::new(HistoryStore::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for n in 0..40 {
                        store.append(record(t * 100 + n, "map", n % 2 == 0, 1.0));
                        let snapshot = store.query(usize::MAX);
                        assert!(snapshot.len() <= 50);
                        assert!(snapshot.iter().all(|r| r.success == r.result.is_success()));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 50);
        assert_eq!(store.statistics().total_tasks, 50);
    }
}
