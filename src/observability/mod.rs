//! 可观测性：日志初始化与遥测存储（追踪 / 事件 / 指标）

pub mod ring;
pub mod telemetry;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use ring::RingBuffer;
pub use telemetry::{
    Event, MetricSample, MetricSummary, TelemetryLimits, TelemetrySnapshot, TelemetryStore,
    TelemetrySummary, Trace, TracePhase, DEFAULT_EVENT_CAPACITY, DEFAULT_METRIC_CAPACITY,
    DEFAULT_TRACE_CAPACITY,
};

/// 日志：默认 info，可通过 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// 读锁；锁中毒时恢复内部数据（临界区只做内存操作，数据不会半更新）
pub(crate) fn read_lock<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::warn!(store = name, "lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// 写锁；同 read_lock
pub(crate) fn write_lock<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::warn!(store = name, "lock poisoned, recovering");
        poisoned.into_inner()
    })
}
