//! 引擎构建器：按配置组装 LLM、领域 Agent、意图分类器与分派上下文
//!
//! REPL 与 HTTP 前端共用同一套构建逻辑；测试可以替换 LLM、地图服务与播放器。

use std::sync::Arc;
use std::time::Duration;

use crate::agents::{
    Agent, AgentDescriptor, AgentRegistry, GeneralAgent, MapAgent, MusicAgent, MAP_KEY, MUSIC_KEY,
};
use crate::config::AppConfig;
use crate::core::{DispatchContext, Dispatcher, IntentClassifier, RegistryError, Supervisor};
use crate::llm::{create_deepseek_client, create_ollama_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::services::{AmapClient, MapService, MediaPlayer, MusicPlatform};

/// 根据配置与环境变量选择 LLM 后端（Ollama / DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.trim().to_lowercase();
    match provider.as_str() {
        "ollama" => {
            let base_url = cfg.llm.ollama.base_url.as_deref();
            let model = cfg.llm.ollama.model.as_deref().or(cfg.llm.model.as_deref());
            let client = create_ollama_client(base_url, model).with_timeout(cfg.llm.timeout());
            tracing::info!("Using Ollama LLM ({})", client.model());
            Arc::new(client)
        }
        "deepseek" => {
            let model = cfg.llm.deepseek.model.as_deref().or(cfg.llm.model.as_deref());
            match create_deepseek_client(model, None) {
                Some(client) => {
                    let client = client.with_timeout(cfg.llm.timeout());
                    tracing::info!("Using DeepSeek LLM ({})", client.model());
                    Arc::new(client)
                }
                None => {
                    tracing::warn!("DEEPSEEK_API_KEY not set, using Mock LLM");
                    Arc::new(MockLlmClient)
                }
            }
        }
        "openai" if std::env::var("OPENAI_API_KEY").is_ok() => {
            let model = cfg
                .llm
                .openai
                .model
                .clone()
                .or_else(|| cfg.llm.model.clone())
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            tracing::info!("Using OpenAI LLM ({})", model);
            Arc::new(
                OpenAiClient::new(
                    cfg.llm.base_url.as_deref(),
                    &model,
                    std::env::var("OPENAI_API_KEY").ok().as_deref(),
                )
                .with_timeout(cfg.llm.timeout()),
            )
        }
        "mock" => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
        other => {
            tracing::warn!(provider = %other, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 引擎构建器
pub struct EngineBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    map_service: Option<Arc<dyn MapService>>,
    player: Option<Arc<dyn MediaPlayer>>,
    extra_agents: Vec<AgentDescriptor>,
    general: bool,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            map_service: None,
            player: None,
            extra_agents: Vec::new(),
            general: true,
        }
    }

    /// 使用指定的 LLM，而不是按配置创建
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_map_service(mut self, service: Arc<dyn MapService>) -> Self {
        self.map_service = Some(service);
        self
    }

    pub fn with_player(mut self, player: Arc<dyn MediaPlayer>) -> Self {
        self.player = Some(player);
        self
    }

    /// 额外注册一个 Agent（路由键取自 Agent 本身）
    pub fn with_agent(mut self, agent: impl Agent + 'static) -> Self {
        self.extra_agents.push(AgentDescriptor::from_agent(agent));
        self
    }

    /// 是否挂载默认对话处理器；关闭后 "general" 路由产生失败结果
    pub fn with_general(mut self, enable: bool) -> Self {
        self.general = enable;
        self
    }

    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        self.llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config))
    }

    pub fn build_context(&self) -> DispatchContext {
        let telemetry = &self.config.telemetry;
        DispatchContext::new(
            self.config.history.capacity,
            telemetry.limits(),
            telemetry.export_dir.clone(),
        )
    }

    fn build_map_service(&self) -> Arc<dyn MapService> {
        self.map_service.clone().unwrap_or_else(|| {
            let map = &self.config.map;
            Arc::new(AmapClient::new(
                map.resolved_api_key(),
                map.timeout_secs,
                map.max_results,
            ))
        })
    }

    fn build_player(&self) -> Arc<dyn MediaPlayer> {
        if let Some(player) = &self.player {
            return player.clone();
        }
        #[cfg(feature = "browser")]
        {
            Arc::new(crate::services::ChromePlayer::new())
        }
        #[cfg(not(feature = "browser"))]
        {
            Arc::new(crate::services::LinkPlayer)
        }
    }

    /// 按 [router].agents 注册领域 Agent；未知名称跳过并告警
    pub fn build_registry(&self, llm: Arc<dyn LlmClient>) -> Result<AgentRegistry, RegistryError> {
        let mut registry = AgentRegistry::new();
        for name in &self.config.router.agents {
            match name.trim().to_lowercase().as_str() {
                MAP_KEY => registry.register_agent(MapAgent::new(llm.clone(), self.build_map_service()))?,
                MUSIC_KEY => registry.register_agent(MusicAgent::new(
                    llm.clone(),
                    self.build_player(),
                    MusicPlatform::from_config(&self.config.music.platform),
                ))?,
                other => tracing::warn!(agent = %other, "unknown agent in config, skipped"),
            }
        }
        for descriptor in &self.extra_agents {
            registry.register(descriptor.key.clone(), descriptor.clone())?;
        }
        tracing::info!(agents = ?registry.keys(), "agent registry ready");
        Ok(registry)
    }

    pub fn build_classifier(
        &self,
        llm: Arc<dyn LlmClient>,
        registry: &AgentRegistry,
        context: &DispatchContext,
    ) -> IntentClassifier {
        let router = &self.config.router;
        let timeout = match router.semantic_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let mut classifier = IntentClassifier::new(llm, context.telemetry.clone())
            .with_fast_match(router.fast_match)
            .with_semantic_timeout(timeout)
            .with_descriptions(registry.descriptions());
        for (key, triggers) in &router.keywords {
            classifier = classifier.with_keywords(key.clone(), triggers.clone());
        }
        classifier
    }

    /// 组装完整引擎
    pub fn build(self) -> Result<Supervisor, RegistryError> {
        let llm = self.build_llm();
        let context = self.build_context();
        let registry = self.build_registry(llm.clone())?;
        let classifier = self.build_classifier(llm.clone(), &registry, &context);
        let mut dispatcher = Dispatcher::new(registry, classifier, context);
        if self.general {
            dispatcher = dispatcher.with_general_handler(Arc::new(GeneralAgent::new(llm)));
        }
        Ok(Supervisor::new(dispatcher))
    }
}
