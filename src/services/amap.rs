//! 高德地图 REST 客户端：POI 搜索与路径规划
//!
//! - `/v3/place/text`：关键字搜索 POI（名称、地址、经纬度）
//! - `/v5/direction/driving`、`/v3/direction/walking`：路径规划，仅取第一条路径
//!
//! 高德在空字段处常返回 `[]` 而不是空字符串，解析时统一按字符串宽松读取。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

pub const AMAP_BASE_URL: &str = "https://restapi.amap.com";

/// 路径规划最多保留的步骤数
const MAX_ROUTE_STEPS: usize = 10;

/// 一个 POI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub address: String,
    /// "lng,lat"
    pub location: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// 出行方式；公交需要更多参数，暂不支持
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Driving,
    Walking,
}

impl TravelMode {
    /// 解析出行方式，不支持的方式回退为驾车
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_lowercase().as_str() {
            "walking" | "walk" | "步行" => TravelMode::Walking,
            "driving" | "drive" | "驾车" | "" => TravelMode::Driving,
            other => {
                tracing::warn!(mode = %other, "unsupported travel mode, using driving");
                TravelMode::Driving
            }
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            TravelMode::Driving => "/v5/direction/driving",
            TravelMode::Walking => "/v3/direction/walking",
        }
    }
}

/// 路径规划结果（第一条路径）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub mode: TravelMode,
    pub distance_m: String,
    pub duration_s: String,
    pub steps: Vec<String>,
}

/// 地图能力
#[async_trait]
pub trait MapService: Send + Sync {
    /// 关键字搜索 POI；无结果时返回空列表
    async fn search_places(&self, keyword: &str, city: Option<&str>) -> Result<Vec<Place>, AgentError>;

    /// 两个 "lng,lat" 之间的路径；无路径时返回 None
    async fn plan_route(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
    ) -> Result<Option<RoutePlan>, AgentError>;
}

/// 高德 REST 客户端
pub struct AmapClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_results: usize,
}

impl AmapClient {
    pub fn new(api_key: Option<String>, timeout_secs: u64, max_results: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build AMap HTTP client ({}), using defaults", e);
                Client::new()
            });
        Self {
            client,
            base_url: AMAP_BASE_URL.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_results: max_results.max(1),
        }
    }

    /// 替换服务地址（私有化部署或测试桩）
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn key(&self) -> Result<&str, AgentError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AgentError::Config("AMAP_API_KEY is not configured".to_string()))
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, AgentError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "amap request");
        // 请求 URL 带有 key，错误文本一律去掉 URL
        let resp = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AgentError::Service(format!("AMap request failed: {}", e.without_url())))?;
        let body: Value = resp.json().await.map_err(|e| {
            AgentError::Service(format!("AMap response is not JSON: {}", e.without_url()))
        })?;
        check_status(&body)?;
        Ok(body)
    }
}

#[async_trait]
impl MapService for AmapClient {
    async fn search_places(&self, keyword: &str, city: Option<&str>) -> Result<Vec<Place>, AgentError> {
        tracing::info!(keyword = %keyword, city = ?city, "poi search");
        let mut params = vec![
            ("keywords", keyword.to_string()),
            ("key", self.key()?.to_string()),
            ("extensions", "base".to_string()),
            ("offset", self.max_results.to_string()),
            ("page", "1".to_string()),
        ];
        if let Some(city) = city.filter(|c| !c.trim().is_empty()) {
            params.push(("city", city.to_string()));
        }
        let body = self.get("/v3/place/text", &params).await?;
        let places = parse_places(&body, self.max_results);
        tracing::info!(count = places.len(), "poi search done");
        Ok(places)
    }

    async fn plan_route(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
    ) -> Result<Option<RoutePlan>, AgentError> {
        tracing::info!(origin = %origin, destination = %destination, mode = ?mode, "route planning");
        let params = [
            ("key", self.key()?.to_string()),
            ("origin", origin.to_string()),
            ("destination", destination.to_string()),
        ];
        let body = self.get(mode.endpoint(), &params).await?;
        Ok(parse_route(&body, mode))
    }
}

/// 高德以 status = "0" 表示失败，info 为原因
fn check_status(body: &Value) -> Result<(), AgentError> {
    match body.get("status").map(text_of).as_deref() {
        Some("0") => Err(AgentError::Service(format!(
            "AMap error: {}",
            body.get("info").map(text_of).unwrap_or_default()
        ))),
        _ => Ok(()),
    }
}

/// 宽松读取字符串字段（数字转字符串，数组/null 视为空）
fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn field(v: &Value, name: &str) -> String {
    v.get(name).map(text_of).unwrap_or_default()
}

pub(crate) fn parse_places(body: &Value, max: usize) -> Vec<Place> {
    body.get("pois")
        .and_then(Value::as_array)
        .map(|pois| {
            pois.iter()
                .take(max)
                .map(|p| Place {
                    name: field(p, "name"),
                    address: field(p, "address"),
                    location: field(p, "location"),
                    kind: field(p, "type"),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_route(body: &Value, mode: TravelMode) -> Option<RoutePlan> {
    let path = body
        .get("route")
        .and_then(|r| r.get("paths"))
        .and_then(Value::as_array)
        .and_then(|paths| paths.first())?;
    // v5 驾车把耗时放在 cost.duration 下
    let duration = match field(path, "duration") {
        d if d.is_empty() => path.get("cost").map(|c| field(c, "duration")).unwrap_or_default(),
        d => d,
    };
    let steps = path
        .get("steps")
        .and_then(Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .map(|s| field(s, "instruction"))
                .filter(|s| !s.is_empty())
                .take(MAX_ROUTE_STEPS)
                .collect()
        })
        .unwrap_or_default();
    Some(RoutePlan {
        mode,
        distance_m: field(path, "distance"),
        duration_s: duration,
        steps,
    })
}
