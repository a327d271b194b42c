//! 地图 Agent：POI 搜索与路径规划
//!
//! 流程：LLM 产出 JSON 计划 → 调用地图服务（路径规划前先把地名解析为经纬度）
//! → LLM 基于工具数据给出最终回答（里程、时长、附近推荐）。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agents::{parse_json_reply, Agent, MAP_KEY};
use crate::core::AgentError;
use crate::llm::{LlmClient, Message};
use crate::services::{MapService, TravelMode};

const MAP_PLAN_PROMPT: &str = r#"你是地图助手的规划器。分析用户意图，只输出一个 JSON 对象，不要输出其他内容：
- 搜索地点：{"action":"search","keyword":"关键字","city":"城市(可省略)"}
- 规划路线：{"action":"route","origin":"起点名称或经纬度","destination":"终点名称或经纬度","city":"城市(可省略)","mode":"driving|walking"}"#;

const MAP_ANSWER_PROMPT: &str = "你是一个专业的地图和行程规划助理。基于工具返回的数据与常识，用中文给出简洁的回答或行程建议（里程、时长、附近推荐）。数据为空时如实告知。";

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
enum MapPlan {
    Search {
        keyword: String,
        #[serde(default)]
        city: Option<String>,
    },
    Route {
        origin: String,
        destination: String,
        #[serde(default)]
        city: Option<String>,
        #[serde(default)]
        mode: Option<String>,
    },
}

pub struct MapAgent {
    llm: Arc<dyn LlmClient>,
    service: Arc<dyn MapService>,
}

impl MapAgent {
    pub fn new(llm: Arc<dyn LlmClient>, service: Arc<dyn MapService>) -> Self {
        Self { llm, service }
    }

    async fn plan(&self, input: &str) -> Result<MapPlan, AgentError> {
        let reply = self
            .llm
            .complete(&[Message::system(MAP_PLAN_PROMPT), Message::user(input)])
            .await?;
        parse_json_reply(&reply)
    }

    /// 执行计划，返回交给 LLM 总结的工具数据
    async fn run_plan(&self, plan: MapPlan) -> Result<Value, AgentError> {
        match plan {
            MapPlan::Search { keyword, city } => {
                let places = self.service.search_places(&keyword, city.as_deref()).await?;
                Ok(json!({ "action": "search", "keyword": keyword, "places": places }))
            }
            MapPlan::Route {
                origin,
                destination,
                city,
                mode,
            } => {
                let from = self.locate(&origin, city.as_deref()).await?;
                let to = self.locate(&destination, city.as_deref()).await?;
                let mode = TravelMode::parse(mode.as_deref().unwrap_or_default());
                let route = self.service.plan_route(&from, &to, mode).await?;
                Ok(json!({
                    "action": "route",
                    "origin": origin,
                    "destination": destination,
                    "route": route,
                }))
            }
        }
    }

    /// 地名 -> "lng,lat"；已是经纬度时原样返回
    async fn locate(&self, place: &str, city: Option<&str>) -> Result<String, AgentError> {
        if is_coordinate(place) {
            return Ok(place.trim().to_string());
        }
        self.service
            .search_places(place, city)
            .await?
            .into_iter()
            .map(|p| p.location)
            .find(|loc| !loc.is_empty())
            .ok_or_else(|| AgentError::Service(format!("未找到地点: {}", place)))
    }
}

fn is_coordinate(text: &str) -> bool {
    let mut parts = text.trim().split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lng), Some(lat), None) => {
            lng.trim().parse::<f64>().is_ok() && lat.trim().parse::<f64>().is_ok()
        }
        _ => false,
    }
}

#[async_trait]
impl Agent for MapAgent {
    fn key(&self) -> &str {
        MAP_KEY
    }

    fn label(&self) -> &str {
        "地图助手"
    }

    fn description(&self) -> &str {
        "地点搜索、地址查询、路线规划与导航"
    }

    async fn execute(&self, input: &str) -> Result<String, AgentError> {
        let plan = self.plan(input).await?;
        tracing::debug!(plan = ?plan, "map plan");
        let data = self.run_plan(plan).await?;
        let question = format!("用户请求：{}\n\n工具返回数据：\n{}", input, data);
        Ok(self
            .llm
            .complete(&[Message::system(MAP_ANSWER_PROMPT), Message::user(question)])
            .await?)
    }
}
