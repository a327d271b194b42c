//! 音乐播放自动化：打开平台搜索页、读取第一条结果、点击播放
//!
//! - `LinkPlayer`：不控制浏览器，只给出搜索页链接
//! - `ChromePlayer`（feature "browser"）：通过 headless_chrome 驱动本机 Chrome/Chromium

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 音乐平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicPlatform {
    Qq,
    Netease,
}

impl MusicPlatform {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "qq" | "qqmusic" | "qq音乐" => Some(MusicPlatform::Qq),
            "netease" | "163" | "网易云" | "网易云音乐" => Some(MusicPlatform::Netease),
            _ => None,
        }
    }

    /// 解析配置中的平台名，未知值回退为 QQ 音乐
    pub fn from_config(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            tracing::warn!(platform = %name, "unknown music platform, using qq");
            MusicPlatform::Qq
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            MusicPlatform::Qq => "QQ音乐",
            MusicPlatform::Netease => "网易云音乐",
        }
    }

    /// 平台搜索页地址
    pub fn search_url(&self, query: &str) -> Result<String, AgentError> {
        match self {
            MusicPlatform::Qq => Url::parse_with_params(
                "https://y.qq.com/n/ryqq/search",
                &[("w", query), ("t", "song")],
            )
            .map(String::from)
            .map_err(bad_url),
            MusicPlatform::Netease => {
                // 网易云是 hash 路由，查询串放在 fragment 里
                let encoded = Url::parse_with_params("https://music.163.com/", &[("s", query)])
                    .map_err(bad_url)?;
                let mut url = Url::parse("https://music.163.com/").map_err(bad_url)?;
                url.set_fragment(Some(&format!(
                    "/search/m/?{}",
                    encoded.query().unwrap_or_default()
                )));
                Ok(url.into())
            }
        }
    }
}

fn bad_url(e: impl std::fmt::Display) -> AgentError {
    AgentError::Config(format!("bad search url: {}", e))
}

/// 搜索结果：第一条命中（浏览器不可用时只有链接）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub platform: MusicPlatform,
    pub query: String,
    pub search_url: String,
    pub title: Option<String>,
}

/// 播放结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playback {
    pub hit: SearchHit,
    pub playing: bool,
}

/// 媒体播放能力
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, platform: MusicPlatform, query: &str) -> Result<SearchHit, AgentError>;

    async fn play(&self, hit: SearchHit) -> Result<Playback, AgentError>;
}

/// 只生成链接的播放器
#[derive(Debug, Default)]
pub struct LinkPlayer;

#[async_trait]
impl MediaPlayer for LinkPlayer {
    fn name(&self) -> &str {
        "link"
    }

    async fn search(&self, platform: MusicPlatform, query: &str) -> Result<SearchHit, AgentError> {
        Ok(SearchHit {
            platform,
            query: query.to_string(),
            search_url: platform.search_url(query)?,
            title: None,
        })
    }

    async fn play(&self, hit: SearchHit) -> Result<Playback, AgentError> {
        Ok(Playback { hit, playing: false })
    }
}

#[cfg(feature = "browser")]
pub use chrome::ChromePlayer;

#[cfg(feature = "browser")]
mod chrome {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use headless_chrome::{Browser, LaunchOptions, Tab};

    use super::{MediaPlayer, MusicPlatform, Playback, SearchHit};
    use crate::core::AgentError;

    const QQ_FIRST_TITLE_JS: &str = r#"(() => {
        const item = document.querySelector('.songlist__item, [data-songid]');
        if (!item) return null;
        const name = item.querySelector('.songlist__songname_txt, .songlist__songname, a');
        return name ? name.innerText.trim() : item.innerText.trim().split('\n')[0];
    })()"#;

    const QQ_PLAY_JS: &str = r#"(() => {
        const item = document.querySelector('.songlist__item');
        if (!item) return false;
        const btn = item.querySelector('.list_menu__item.list_menu__play');
        if (!btn) return false;
        btn.click();
        return true;
    })()"#;

    const NETEASE_FIRST_TITLE_JS: &str = r#"(() => {
        const frame = document.querySelector('#g_iframe');
        const doc = frame && frame.contentDocument ? frame.contentDocument : document;
        const item = doc.querySelector('.srchsongst .item');
        if (!item) return null;
        const title = item.querySelector('.sn .text a b, .sn .text a');
        return title ? (title.getAttribute('title') || title.innerText).trim() : null;
    })()"#;

    const NETEASE_PLAY_JS: &str = r#"(() => {
        const frame = document.querySelector('#g_iframe');
        const doc = frame && frame.contentDocument ? frame.contentDocument : document;
        const item = doc.querySelector('.srchsongst .item');
        if (!item) return false;
        const btn = item.querySelector('a.ply[data-res-action="play"]');
        if (!btn) return false;
        btn.click();
        return true;
    })()"#;

    struct Session {
        // Browser 必须与 Tab 同生命周期，否则 Chrome 进程会被关闭
        _browser: Browser,
        tab: Arc<Tab>,
    }

    /// 浏览器播放器：复用同一个可见的 Chrome 窗口
    pub struct ChromePlayer {
        session: Arc<Mutex<Option<Session>>>,
        settle: Duration,
    }

    impl Default for ChromePlayer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ChromePlayer {
        pub fn new() -> Self {
            Self {
                session: Arc::new(Mutex::new(None)),
                settle: Duration::from_millis(1500),
            }
        }

        fn launch() -> Result<Session, AgentError> {
            let options = LaunchOptions::default_builder()
                .headless(false)
                .build()
                .map_err(|e| AgentError::Browser(format!("Chrome options invalid: {}", e)))?;
            let browser = Browser::new(options).map_err(|e| {
                AgentError::Browser(format!("Chrome launch failed: {}. Install Chrome/Chromium.", e))
            })?;
            let tab = browser
                .new_tab()
                .map_err(|e| AgentError::Browser(format!("Browser tab failed: {}", e)))?;
            Ok(Session {
                _browser: browser,
                tab,
            })
        }

        fn with_tab<T: Send + 'static>(
            &self,
            f: impl FnOnce(&Arc<Tab>) -> Result<T, AgentError> + Send + 'static,
        ) -> impl std::future::Future<Output = Result<T, AgentError>> {
            let session = Arc::clone(&self.session);
            async move {
                tokio::task::spawn_blocking(move || {
                    let mut guard = session.lock().unwrap_or_else(|p| p.into_inner());
                    if guard.is_none() {
                        *guard = Some(Self::launch()?);
                    }
                    match guard.as_ref() {
                        Some(s) => f(&s.tab),
                        None => Err(AgentError::Browser("browser session unavailable".to_string())),
                    }
                })
                .await
                .map_err(|e| AgentError::Browser(format!("browser task failed: {}", e)))?
            }
        }
    }

    fn eval(tab: &Arc<Tab>, js: &str) -> Result<serde_json::Value, AgentError> {
        tab.evaluate(js, false)
            .map(|obj| obj.value.unwrap_or(serde_json::Value::Null))
            .map_err(|e| AgentError::Browser(format!("Script failed: {}", e)))
    }

    #[async_trait]
    impl MediaPlayer for ChromePlayer {
        fn name(&self) -> &str {
            "chrome"
        }

        async fn search(&self, platform: MusicPlatform, query: &str) -> Result<SearchHit, AgentError> {
            let url = platform.search_url(query)?;
            let query = query.to_string();
            let settle = self.settle;
            tracing::info!(url = %url, "music search in browser");
            self.with_tab(move |tab| {
                tab.navigate_to(&url)
                    .map_err(|e| AgentError::Browser(format!("Navigate failed: {}", e)))?;
                tab.wait_until_navigated()
                    .map_err(|e| AgentError::Browser(format!("Page load failed: {}", e)))?;
                std::thread::sleep(settle);
                let js = match platform {
                    MusicPlatform::Qq => QQ_FIRST_TITLE_JS,
                    MusicPlatform::Netease => NETEASE_FIRST_TITLE_JS,
                };
                let title = eval(tab, js)?
                    .as_str()
                    .map(str::to_string)
                    .filter(|t| !t.is_empty());
                Ok(SearchHit {
                    platform,
                    query,
                    search_url: url,
                    title,
                })
            })
            .await
        }

        async fn play(&self, hit: SearchHit) -> Result<Playback, AgentError> {
            if hit.title.is_none() {
                return Ok(Playback { hit, playing: false });
            }
            self.with_tab(move |tab| {
                let js = match hit.platform {
                    MusicPlatform::Qq => QQ_PLAY_JS,
                    MusicPlatform::Netease => NETEASE_PLAY_JS,
                };
                let clicked = eval(tab, js)?.as_bool().unwrap_or(false);
                if !clicked {
                    tracing::warn!(platform = hit.platform.label(), "play button not found");
                }
                Ok(Playback { hit, playing: clicked })
            })
            .await
        }
    }
}
