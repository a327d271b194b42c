//! 任务分派器
//!
//! 一次分派：分类（或使用显式指定的路由键）→ 调用 Agent → 计时 → 打包 TaskResult
//! → 写入遥测与历史 → 返回。
//!
//! 只有未知的显式路由键会以 RegistryError 返回；分类失败与 Agent 执行失败
//! 都被收敛为 TaskResult，调用方通过 `is_success()` 判断。分派器不做重试。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde_json::json;
use uuid::Uuid;

use crate::agents::{Agent, AgentRegistry, GENERAL_KEY};
use crate::core::{
    DispatchContext, HistoryRecord, IntentClassifier, RegistryError, RouteSource, TaskMetadata,
    TaskResult,
};
use crate::observability::Trace;

/// 任务 ID：v4 UUID 的前 8 位
pub fn new_task_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub struct Dispatcher {
    registry: AgentRegistry,
    classifier: IntentClassifier,
    /// "general" 未注册时使用的默认对话处理器
    general: Option<Arc<dyn Agent>>,
    context: DispatchContext,
}

impl Dispatcher {
    pub fn new(registry: AgentRegistry, classifier: IntentClassifier, context: DispatchContext) -> Self {
        Self {
            registry,
            classifier,
            general: None,
            context,
        }
    }

    pub fn with_general_handler(mut self, agent: Arc<dyn Agent>) -> Self {
        self.general = Some(agent);
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn context(&self) -> &DispatchContext {
        &self.context
    }

    /// 执行一次分派
    pub async fn execute(
        &self,
        user_input: &str,
        override_key: Option<&str>,
    ) -> Result<TaskResult, RegistryError> {
        // 显式路由键必须在任何 Agent 被调用之前校验
        let overridden = match override_key {
            Some(key) => Some((key.to_string(), self.resolve(key)?)),
            None => None,
        };

        let task_id = new_task_id();
        let started_at = Local::now();
        let telemetry = &self.context.telemetry;
        tracing::info!(task_id = %task_id, input = %crate::agents::preview(user_input), "task started");

        telemetry.record_trace(Trace::start(&task_id, "classify"));
        let classify_started = Instant::now();
        let (agent_type, route, unit) = match overridden {
            Some((key, unit)) => (key, RouteSource::Override, Some(unit)),
            None => {
                let candidates = self.registry.keys();
                let classification = self.classifier.classify(user_input, &candidates).await;
                let unit = self.resolve(&classification.key).ok();
                (classification.key, classification.source, unit)
            }
        };
        telemetry.record_trace(
            Trace::end(&task_id, "classify", classify_started.elapsed())
                .with_metadata(json!({ "agent_type": agent_type, "route": route.as_str() })),
        );
        tracing::info!(task_id = %task_id, agent_type = %agent_type, route = route.as_str(), "agent selected");
        telemetry.record_event(
            "agent_selection",
            json!({ "task_id": task_id, "agent_type": agent_type, "route": route.as_str() }),
        );

        // 执行与记录放在独立任务里：调用方的 future 被丢弃时，已开始的分派仍会写完历史与遥测
        let completion = Completion {
            task_id,
            user_input: user_input.to_string(),
            agent_type,
            route,
            started_at,
            unit,
            context: self.context.clone(),
        };
        let fallback = completion.aborted_result();
        match tokio::spawn(completion.run()).await {
            Ok(result) => Ok(result),
            Err(join_err) => {
                tracing::error!(error = %join_err, "dispatch task aborted");
                Ok(fallback)
            }
        }
    }

    /// 路由键 -> 执行单元；"general" 未注册时落到默认对话处理器
    fn resolve(&self, key: &str) -> Result<Arc<dyn Agent>, RegistryError> {
        match self.registry.resolve(key) {
            Ok(descriptor) => Ok(descriptor.agent.clone()),
            Err(err) => match (&self.general, key == GENERAL_KEY) {
                (Some(general), true) => Ok(general.clone()),
                _ => Err(err),
            },
        }
    }
}

/// 分派的后半段：调用 Agent、打包结果、写入遥测与历史
struct Completion {
    task_id: String,
    user_input: String,
    agent_type: String,
    route: RouteSource,
    started_at: DateTime<Local>,
    unit: Option<Arc<dyn Agent>>,
    context: DispatchContext,
}

impl Completion {
    /// 分派任务本身被中止时返回给调用方的结果（不写入历史）
    fn aborted_result(&self) -> TaskResult {
        let metadata = TaskMetadata {
            task_id: self.task_id.clone(),
            execution_time: 0.0,
            route: self.route,
            started_at: self.started_at,
        };
        TaskResult::failure(&self.agent_type, "Dispatch task aborted", metadata)
    }

    async fn run(self) -> TaskResult {
        let Completion {
            task_id,
            user_input,
            agent_type,
            route,
            started_at,
            unit,
            context,
        } = self;
        let telemetry = &context.telemetry;

        telemetry.record_trace(Trace::start(&task_id, "execute"));
        let exec_started = Instant::now();
        let outcome = match unit {
            Some(unit) => run_isolated(unit, &user_input).await,
            None => Err(format!("No handler registered for agent type: {}", agent_type)),
        };
        let elapsed = exec_started.elapsed();
        telemetry.record_trace(
            Trace::end(&task_id, "execute", elapsed)
                .with_metadata(json!({ "agent_type": agent_type, "success": outcome.is_ok() })),
        );

        let metadata = TaskMetadata {
            task_id: task_id.clone(),
            execution_time: elapsed.as_secs_f64(),
            route,
            started_at,
        };
        let result = match outcome {
            Ok(content) => {
                tracing::info!(task_id = %task_id, secs = elapsed.as_secs_f64(), "task succeeded");
                telemetry.record_metric(format!("agent.{}.success", agent_type), 1.0);
                TaskResult::success(&agent_type, content, metadata)
            }
            Err(error) => {
                tracing::warn!(task_id = %task_id, error = %error, "task failed");
                telemetry.record_metric(format!("agent.{}.failure", agent_type), 1.0);
                let result = TaskResult::failure(&agent_type, &error, metadata);
                telemetry.record_event(
                    "agent_failure",
                    json!({
                        "task_id": task_id,
                        "agent_type": agent_type,
                        "error": result.error(),
                        "execution_time": elapsed.as_secs_f64(),
                    }),
                );
                result
            }
        };
        telemetry.record_metric(
            format!("agent.{}.execution_time", agent_type),
            elapsed.as_secs_f64(),
        );

        context
            .history
            .append(HistoryRecord::new(user_input, result.clone()));
        result
    }
}

/// 在独立任务中运行 Agent，执行错误与 panic 都转为错误文本
async fn run_isolated(unit: Arc<dyn Agent>, user_input: &str) -> Result<String, String> {
    let input = user_input.to_string();
    match tokio::spawn(async move { unit.execute(&input).await }).await {
        Ok(Ok(content)) => Ok(content),
        Ok(Err(e)) => Err(e.to_string()),
        Err(join_err) if join_err.is_panic() => Err("Agent panicked during execution".to_string()),
        Err(join_err) => Err(format!("Agent task aborted: {}", join_err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentError;
    use crate::llm::ScriptedLlmClient;
    use async_trait::async_trait;

    struct Echo(&'static str);

    #[async_trait]
    impl Agent for Echo {
        fn key(&self) -> &str {
            self.0
        }
        fn label(&self) -> &str {
            "Echo"
        }
        fn description(&self) -> &str {
            "echo"
        }
        async fn execute(&self, input: &str) -> Result<String, AgentError> {
            Ok(format!("{}:{}", self.0, input))
        }
    }

    struct Panicky;

    #[async_trait]
    impl Agent for Panicky {
        fn key(&self) -> &str {
            "map"
        }
        fn label(&self) -> &str {
            "Panicky"
        }
        fn description(&self) -> &str {
            "panics"
        }
        async fn execute(&self, _input: &str) -> Result<String, AgentError> {
            panic!("unit bug")
        }
    }

    fn dispatcher(registry: AgentRegistry, llm: Arc<ScriptedLlmClient>) -> Dispatcher {
        let context = DispatchContext::default();
        let classifier = IntentClassifier::new(llm, context.telemetry.clone());
        Dispatcher::new(registry, classifier, context)
    }

    #[test]
    fn test_task_id_is_eight_hex_chars() {
        let id = new_task_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_task_id());
    }

    #[tokio::test]
    async fn test_unknown_override_fails_before_anything_is_recorded() {
        let mut registry = AgentRegistry::new();
        registry.register_agent(Echo("map")).unwrap();
        let d = dispatcher(registry, Arc::new(ScriptedLlmClient::new()));
        let err = d.execute("hi", Some("weather")).await.unwrap_err();
        assert_eq!(err, RegistryError::UnknownAgent("weather".to_string()));
        assert!(d.context().history.is_empty());
        assert!(d.context().telemetry.traces(None).is_empty());
    }

    #[tokio::test]
    async fn test_panicking_unit_becomes_failed_result() {
        let mut registry = AgentRegistry::new();
        registry.register_agent(Panicky).unwrap();
        let d = dispatcher(registry, Arc::new(ScriptedLlmClient::new()));
        let result = d.execute("查询位置", None).await.unwrap();
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("panicked"));
        assert_eq!(d.context().telemetry.events(Some("agent_failure")).len(), 1);
    }

    #[tokio::test]
    async fn test_general_without_handler_is_failed_result() {
        let d = dispatcher(
            AgentRegistry::new(),
            Arc::new(ScriptedLlmClient::new().reply("general")),
        );
        let result = d.execute("你好", None).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.agent_type(), "general");
        assert_eq!(d.context().history.len(), 1);
    }

    #[tokio::test]
    async fn test_general_override_uses_default_handler() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let d = dispatcher(AgentRegistry::new(), llm.clone())
            .with_general_handler(Arc::new(Echo("general")));
        let result = d.execute("播放青花瓷", Some("general")).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.content(), "general:播放青花瓷");
        assert_eq!(result.metadata().route, RouteSource::Override);
        assert_eq!(llm.calls(), 0);
    }

    struct Slow;

    #[async_trait]
    impl Agent for Slow {
        fn key(&self) -> &str {
            "music"
        }
        fn label(&self) -> &str {
            "Slow"
        }
        fn description(&self) -> &str {
            "slow"
        }
        async fn execute(&self, _input: &str) -> Result<String, AgentError> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok("done".to_string())
        }
    }

    #[tokio::test]
    async fn test_dropped_caller_still_records_dispatch() {
        let mut registry = AgentRegistry::new();
        registry.register_agent(Slow).unwrap();
        let d = dispatcher(registry, Arc::new(ScriptedLlmClient::new()));
        let dispatch = d.execute("播放晴天", None);
        assert!(tokio::time::timeout(std::time::Duration::from_millis(20), dispatch)
            .await
            .is_err());

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let history = d.context().history.query(10);
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(d.context().telemetry.traces(Some(&history[0].task_id)).len(), 4);
    }

    #[tokio::test]
    async fn test_traces_bracket_both_steps() {
        let mut registry = AgentRegistry::new();
        registry.register_agent(Echo("music")).unwrap();
        let d = dispatcher(registry, Arc::new(ScriptedLlmClient::new()));
        let result = d.execute("播放晴天", None).await.unwrap();
        let traces = d.context().telemetry.traces(Some(result.task_id()));
        let spans: Vec<(String, crate::observability::TracePhase)> =
            traces.iter().map(|t| (t.span.clone(), t.phase)).collect();
        use crate::observability::TracePhase::{End, Start};
        assert_eq!(
            spans,
            vec![
                ("classify".to_string(), Start),
                ("classify".to_string(), End),
                ("execute".to_string(), Start),
                ("execute".to_string(), End),
            ]
        );
    }
}
