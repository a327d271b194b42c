//! 外部能力：地图服务（高德 REST）与媒体播放自动化（浏览器）
//!
//! Agent 只依赖这里的 trait，便于测试时替换为假实现。

pub mod amap;
pub mod player;

pub use amap::{AmapClient, MapService, Place, RoutePlan, TravelMode, AMAP_BASE_URL};
pub use player::{LinkPlayer, MediaPlayer, MusicPlatform, Playback, SearchHit};

#[cfg(feature = "browser")]
pub use player::ChromePlayer;
