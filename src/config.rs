//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=ollama`）。
//! 所有字段都有默认值，没有任何配置文件时也能启动。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{DEFAULT_HISTORY_CAPACITY, DEFAULT_SEMANTIC_TIMEOUT};
use crate::observability::{
    TelemetryLimits, DEFAULT_EVENT_CAPACITY, DEFAULT_METRIC_CAPACITY, DEFAULT_TRACE_CAPACITY,
};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub router: RouterSection,
    pub history: HistorySection,
    pub telemetry: TelemetrySection,
    pub map: MapSection,
    pub music: MusicSection,
    pub web: WebSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：ollama / deepseek / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 通用模型名，未在子段中指定时使用
    pub model: Option<String>,
    /// OpenAI 兼容端点地址
    pub base_url: Option<String>,
    /// 单次 LLM 请求时限（秒），0 表示不限
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub ollama: LlmOllamaSection,
    #[serde(default)]
    pub deepseek: LlmModelSection,
    #[serde(default)]
    pub openai: LlmModelSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
            ollama: LlmOllamaSection::default(),
            deepseek: LlmModelSection::default(),
            openai: LlmModelSection::default(),
        }
    }
}

impl LlmSection {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOllamaSection {
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmModelSection {
    pub model: Option<String>,
}

/// [router] 段：意图分类
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSection {
    /// 是否启用关键词快速匹配
    #[serde(default = "default_true")]
    pub fast_match: bool,
    /// LLM 分类超时（秒），0 表示不限
    #[serde(default = "default_semantic_timeout_secs")]
    pub semantic_timeout_secs: u64,
    /// 启用的领域 Agent
    #[serde(default = "default_agents")]
    pub agents: Vec<String>,
    /// 路由键 -> 触发词，覆盖内置触发词
    #[serde(default)]
    pub keywords: HashMap<String, Vec<String>>,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            fast_match: true,
            semantic_timeout_secs: default_semantic_timeout_secs(),
            agents: default_agents(),
            keywords: HashMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_semantic_timeout_secs() -> u64 {
    DEFAULT_SEMANTIC_TIMEOUT.as_secs()
}

fn default_agents() -> Vec<String> {
    vec!["map".into(), "music".into()]
}

/// [history] 段
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySection {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

/// [telemetry] 段：三条日志的容量与导出目录
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_trace_capacity")]
    pub trace_capacity: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_metric_capacity")]
    pub metric_capacity: usize,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            trace_capacity: default_trace_capacity(),
            event_capacity: default_event_capacity(),
            metric_capacity: default_metric_capacity(),
            export_dir: default_export_dir(),
        }
    }
}

impl TelemetrySection {
    pub fn limits(&self) -> TelemetryLimits {
        TelemetryLimits {
            trace_capacity: self.trace_capacity,
            event_capacity: self.event_capacity,
            metric_capacity: self.metric_capacity,
        }
    }
}

fn default_trace_capacity() -> usize {
    DEFAULT_TRACE_CAPACITY
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_metric_capacity() -> usize {
    DEFAULT_METRIC_CAPACITY
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// [map] 段：高德 Web 服务
#[derive(Debug, Clone, Deserialize)]
pub struct MapSection {
    /// 未设置时读取环境变量 AMAP_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_map_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for MapSection {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_secs: default_map_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

impl MapSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("AMAP_API_KEY").ok())
    }
}

fn default_map_timeout_secs() -> u64 {
    10
}

fn default_max_results() -> usize {
    5
}

/// [music] 段
#[derive(Debug, Clone, Deserialize)]
pub struct MusicSection {
    /// qq / netease
    #[serde(default = "default_platform")]
    pub platform: String,
}

impl Default for MusicSection {
    fn default() -> Self {
        Self {
            platform: default_platform(),
        }
    }
}

fn default_platform() -> String {
    "qq".to_string()
}

/// [web] 段：hive-web 监听端口
#[derive(Debug, Clone, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            port: default_web_port(),
        }
    }
}

fn default_web_port() -> u16 {
    8080
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, skipped");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 按启动时的同一组来源重新加载配置（调用方决定是否用新配置重建引擎）
pub fn reload_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    tracing::info!("reloading config");
    load_config(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "ollama");
        assert!(cfg.router.fast_match);
        assert_eq!(cfg.router.semantic_timeout_secs, 30);
        assert_eq!(cfg.router.agents, vec!["map", "music"]);
        assert_eq!(cfg.history.capacity, 100);
        assert_eq!(cfg.telemetry.limits(), TelemetryLimits::default());
        assert_eq!(cfg.telemetry.export_dir, PathBuf::from("logs"));
        assert_eq!(cfg.map.timeout_secs, 10);
        assert_eq!(cfg.music.platform, "qq");
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
provider = "mock"

[router]
fast_match = false
agents = ["map"]

[router.keywords]
map = ["去哪"]

[history]
capacity = 7

[telemetry]
event_capacity = 3
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert!(!cfg.router.fast_match);
        assert_eq!(cfg.router.agents, vec!["map"]);
        assert_eq!(cfg.router.keywords["map"], vec!["去哪"]);
        assert_eq!(cfg.history.capacity, 7);
        assert_eq!(cfg.telemetry.event_capacity, 3);
        assert_eq!(cfg.telemetry.trace_capacity, 1000);
        assert_eq!(cfg.router.semantic_timeout_secs, 30);
    }

    #[test]
    fn test_reload_picks_up_file_changes() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::fs::write(file.path(), "[history]\ncapacity = 5\n").unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.history.capacity, 5);

        std::fs::write(file.path(), "[history]\ncapacity = 9\n\n[llm]\ntimeout_secs = 0\n").unwrap();
        let cfg = reload_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.history.capacity, 9);
        assert_eq!(cfg.llm.timeout(), None);
    }

    #[test]
    fn test_llm_timeout_default() {
        assert_eq!(AppConfig::default().llm.timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_map_key_prefers_config_value() {
        let section = MapSection {
            api_key: Some("from-config".to_string()),
            ..MapSection::default()
        };
        assert_eq!(section.resolved_api_key().as_deref(), Some("from-config"));
    }
}
