//! Hive HTTP API
//!
//! 启动: cargo run --bin hive-web --features web
//! 示例: curl -X POST http://127.0.0.1:8080/api/tasks -H 'content-type: application/json' -d '{"input":"播放晴天"}'

#![cfg(feature = "web")]

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use hive::config::load_config;
use hive::core::{AgentInfo, HistoryRecord, TaskStatistics, TelemetryError};
use hive::observability::{self, Event, MetricSample, Trace};
use hive::{EngineBuilder, Supervisor, TaskResult};

type AppState = Arc<Supervisor>;

#[derive(Debug, Deserialize)]
struct TaskRequest {
    input: String,
    /// 指定 Agent，跳过意图分类
    agent_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TraceQuery {
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventQuery {
    event_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetricQuery {
    name: Option<String>,
}

/// 只接受文件名，文件写在 [telemetry].export_dir 下
#[derive(Debug, Default, Deserialize)]
struct ExportRequest {
    #[serde(alias = "path")]
    file_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExportResponse {
    path: String,
}

async fn api_tasks_create(
    State(state): State<AppState>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskResult>, (StatusCode, String)> {
    let agent = req.agent_type.as_deref().filter(|s| !s.trim().is_empty());
    state
        .execute_task(&req.input, agent)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

async fn api_tasks_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Json<Vec<HistoryRecord>> {
    Json(state.get_task_history(q.limit.unwrap_or(10)))
}

async fn api_statistics(State(state): State<AppState>) -> Json<TaskStatistics> {
    Json(state.get_statistics())
}

async fn api_traces(State(state): State<AppState>, Query(q): Query<TraceQuery>) -> Json<Vec<Trace>> {
    Json(state.get_traces(q.task_id.as_deref()))
}

async fn api_events(State(state): State<AppState>, Query(q): Query<EventQuery>) -> Json<Vec<Event>> {
    Json(state.get_events(q.event_type.as_deref()))
}

async fn api_metrics(
    State(state): State<AppState>,
    Query(q): Query<MetricQuery>,
) -> Json<BTreeMap<String, Vec<MetricSample>>> {
    Json(state.get_metrics(q.name.as_deref()))
}

async fn api_export(
    State(state): State<AppState>,
    body: Option<Json<ExportRequest>>,
) -> Result<Json<ExportResponse>, (StatusCode, String)> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    // 文件 I/O 放到阻塞线程池
    let path = tokio::task::spawn_blocking(move || state.export_named(req.file_name.as_deref()))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| match e {
            TelemetryError::InvalidFileName(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        })?;
    Ok(Json(ExportResponse {
        path: path.display().to_string(),
    }))
}

async fn api_agents(State(state): State<AppState>) -> Json<Vec<AgentInfo>> {
    Json(state.agents())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tasks", post(api_tasks_create))
        .route("/api/tasks/history", get(api_tasks_history))
        .route("/api/statistics", get(api_statistics))
        .route("/api/traces", get(api_traces))
        .route("/api/events", get(api_events))
        .route("/api/metrics", get(api_metrics))
        .route("/api/export", post(api_export))
        .route("/api/agents", get(api_agents))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let port = std::env::var("HIVE_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.web.port);
    let supervisor = EngineBuilder::new(cfg)
        .build()
        .context("Failed to build engine")?;

    let app = router(Arc::new(supervisor));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Hive API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
