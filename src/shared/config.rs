use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub story: StoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryConfig {
    /// ストーリー1件あたりの自動送りの間隔（ミリ秒）
    pub advance_interval_ms: u64,
    pub feed_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:5000".to_string(),
                timeout_secs: 30,
            },
            story: StoryConfig::default(),
        }
    }
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            advance_interval_ms: 5000, // 1ストーリーあたり5秒
            feed_limit: 50,
        }
    }
}

impl StoryConfig {
    pub fn advance_interval(&self) -> Duration {
        Duration::from_millis(self.advance_interval_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("TSUNAGU_API_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.api.base_url = trimmed.trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("TSUNAGU_API_TIMEOUT_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.api.timeout_secs = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("TSUNAGU_STORY_ADVANCE_MS") {
            if let Some(value) = parse_u64(&v) {
                cfg.story.advance_interval_ms = value;
            }
        }
        if let Ok(v) = std::env::var("TSUNAGU_STORY_FEED_LIMIT") {
            if let Some(value) = parse_u64(&v) {
                cfg.story.feed_limit = value.min(u32::MAX as u64) as u32;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.api.base_url.trim().is_empty() {
            return Err(AppError::Configuration(
                "Api base_url must not be empty".to_string(),
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::Configuration(
                "Api timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.story.advance_interval_ms == 0 {
            return Err(AppError::Configuration(
                "Story advance_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.story.feed_limit == 0 {
            return Err(AppError::Configuration(
                "Story feed_limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
