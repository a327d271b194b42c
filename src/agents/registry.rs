//! Agent 注册表
//!
//! 启动时按配置构建，之后只读：register 拒绝重复键，resolve 拒绝未知键，
//! keys 提供给意图分类器作为封闭的候选集合。

use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::Agent;
use crate::core::RegistryError;

/// 注册表条目：路由键、展示名、描述与执行单元
#[derive(Clone)]
pub struct AgentDescriptor {
    pub key: String,
    pub label: String,
    pub description: String,
    pub agent: Arc<dyn Agent>,
}

impl AgentDescriptor {
    /// 以 Agent 自身的 key / label / description 构造
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            key: agent.key().to_string(),
            label: agent.label().to_string(),
            description: agent.description().to_string(),
            agent,
        }
    }

    pub fn from_agent(agent: impl Agent + 'static) -> Self {
        Self::new(Arc::new(agent))
    }
}

impl std::fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("key", &self.key)
            .field("label", &self.label)
            .finish()
    }
}

/// Agent 注册表：路由键 -> AgentDescriptor
#[derive(Default, Debug)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 key 注册；key 已存在时返回 DuplicateKey
    pub fn register(
        &mut self,
        key: impl Into<String>,
        descriptor: AgentDescriptor,
    ) -> Result<(), RegistryError> {
        let key = key.into();
        if self.agents.contains_key(&key) {
            return Err(RegistryError::DuplicateKey(key));
        }
        tracing::debug!(key = %key, label = %descriptor.label, "agent registered");
        self.agents.insert(key, descriptor);
        Ok(())
    }

    /// 以 Agent 自身的 key 注册
    pub fn register_agent(&mut self, agent: impl Agent + 'static) -> Result<(), RegistryError> {
        let descriptor = AgentDescriptor::from_agent(agent);
        self.register(descriptor.key.clone(), descriptor)
    }

    pub fn resolve(&self, key: &str) -> Result<&AgentDescriptor, RegistryError> {
        self.agents
            .get(key)
            .ok_or_else(|| RegistryError::UnknownAgent(key.to_string()))
    }

    /// 所有合法路由键（排序后返回，保证分类提示词稳定）
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.agents.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// (key, description) 列表，按 key 排序
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.keys()
            .into_iter()
            .filter_map(|k| self.agents.get(&k).map(|d| (k, d.description.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentError;
    use async_trait::async_trait;

    struct Stub(&'static str);

    #[async_trait]
    impl Agent for Stub {
        fn key(&self) -> &str {
            self.0
        }
        fn label(&self) -> &str {
            "Stub"
        }
        fn description(&self) -> &str {
            "stub agent"
        }
        async fn execute(&self, input: &str) -> Result<String, AgentError> {
            Ok(input.to_string())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = AgentRegistry::new();
        registry.register_agent(Stub("music")).unwrap();
        registry.register_agent(Stub("map")).unwrap();
        assert_eq!(registry.keys(), vec!["map", "music"]);
        assert_eq!(registry.resolve("map").unwrap().key, "map");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut registry = AgentRegistry::new();
        registry.register_agent(Stub("map")).unwrap();
        let err = registry
            .register("map", AgentDescriptor::from_agent(Stub("map")))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateKey("map".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let registry = AgentRegistry::new();
        let err = registry.resolve("weather").unwrap_err();
        assert_eq!(err, RegistryError::UnknownAgent("weather".to_string()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_resolved_agent_executes() {
        let mut registry = AgentRegistry::new();
        registry.register_agent(Stub("map")).unwrap();
        let out = registry.resolve("map").unwrap().agent.execute("hi").await.unwrap();
        assert_eq!(out, "hi");
    }
}
