//! 音乐 Agent：多平台（QQ 音乐、网易云音乐）搜索与播放
//!
//! LLM 从用户输入中提取歌名、歌手与平台偏好；未指定平台时使用配置的默认平台。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agents::{parse_json_reply, Agent, MUSIC_KEY};
use crate::core::AgentError;
use crate::llm::{LlmClient, Message};
use crate::services::{MediaPlayer, MusicPlatform, Playback};

const MUSIC_PLAN_PROMPT: &str = r#"你是音乐播放助手的解析器。从用户输入中提取歌曲信息，只输出一个 JSON 对象，不要输出其他内容：
{"song":"歌名","artist":"歌手(可为空)","platform":"qq|netease|空(用户未指定)"}"#;

#[derive(Debug, Default, Deserialize)]
struct MusicPlan {
    #[serde(default)]
    song: String,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    platform: Option<String>,
}

impl MusicPlan {
    fn query(&self) -> String {
        match self.artist.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            Some(artist) => format!("{} {}", self.song.trim(), artist),
            None => self.song.trim().to_string(),
        }
    }
}

pub struct MusicAgent {
    llm: Arc<dyn LlmClient>,
    player: Arc<dyn MediaPlayer>,
    default_platform: MusicPlatform,
}

impl MusicAgent {
    pub fn new(llm: Arc<dyn LlmClient>, player: Arc<dyn MediaPlayer>, default_platform: MusicPlatform) -> Self {
        Self {
            llm,
            player,
            default_platform,
        }
    }
}

fn describe(playback: &Playback) -> String {
    let hit = &playback.hit;
    let platform = hit.platform.label();
    match (&hit.title, playback.playing) {
        (Some(title), true) => format!("正在{}播放《{}》", platform, title),
        (Some(title), false) => format!(
            "已在{}找到《{}》，但未能自动播放，请手动点击播放：{}",
            platform, title, hit.search_url
        ),
        (None, _) => format!("已为你打开{}搜索「{}」：{}", platform, hit.query, hit.search_url),
    }
}

#[async_trait]
impl Agent for MusicAgent {
    fn key(&self) -> &str {
        MUSIC_KEY
    }

    fn label(&self) -> &str {
        "音乐助手"
    }

    fn description(&self) -> &str {
        "搜索并播放歌曲（QQ 音乐、网易云音乐）"
    }

    async fn execute(&self, input: &str) -> Result<String, AgentError> {
        let reply = self
            .llm
            .complete(&[Message::system(MUSIC_PLAN_PROMPT), Message::user(input)])
            .await?;
        let plan: MusicPlan = parse_json_reply(&reply)?;
        if plan.song.trim().is_empty() {
            return Err(AgentError::InvalidPlan("no song name in request".to_string()));
        }
        let platform = plan
            .platform
            .as_deref()
            .and_then(MusicPlatform::parse)
            .unwrap_or(self.default_platform);
        let query = plan.query();
        tracing::info!(query = %query, platform = platform.label(), player = self.player.name(), "music request");

        let hit = self.player.search(platform, &query).await?;
        let playback = self.player.play(hit).await?;
        Ok(describe(&playback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::services::{LinkPlayer, SearchHit};

    /// 总能找到并播放第一首的播放器
    struct FakePlayer;

    #[async_trait]
    impl MediaPlayer for FakePlayer {
        fn name(&self) -> &str {
            "fake"
        }

        async fn search(&self, platform: MusicPlatform, query: &str) -> Result<SearchHit, AgentError> {
            Ok(SearchHit {
                platform,
                query: query.to_string(),
                search_url: platform.search_url(query)?,
                title: Some(query.to_string()),
            })
        }

        async fn play(&self, hit: SearchHit) -> Result<Playback, AgentError> {
            Ok(Playback { hit, playing: true })
        }
    }

    #[tokio::test]
    async fn test_plays_on_requested_platform() {
        let llm = Arc::new(
            ScriptedLlmClient::new().reply(r#"{"song":"晴天","artist":"周杰伦","platform":"netease"}"#),
        );
        let agent = MusicAgent::new(llm, Arc::new(FakePlayer), MusicPlatform::Qq);
        let out = agent.execute("用网易云播放周杰伦的晴天").await.unwrap();
        assert_eq!(out, "正在网易云音乐播放《晴天 周杰伦》");
    }

    #[tokio::test]
    async fn test_default_platform_and_link_only_player() {
        let llm = Arc::new(ScriptedLlmClient::new().reply(r#"{"song":"青花瓷","platform":""}"#));
        let agent = MusicAgent::new(llm, Arc::new(LinkPlayer), MusicPlatform::Qq);
        let out = agent.execute("播放青花瓷").await.unwrap();
        assert!(out.contains("QQ音乐"));
        assert!(out.contains("https://y.qq.com/n/ryqq/search?w="));
    }

    #[tokio::test]
    async fn test_missing_song_is_invalid_plan() {
        let llm = Arc::new(ScriptedLlmClient::new().reply(r#"{"song":"  "}"#));
        let agent = MusicAgent::new(llm, Arc::new(FakePlayer), MusicPlatform::Qq);
        let err = agent.execute("放首歌").await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidPlan(_)));
    }
}
