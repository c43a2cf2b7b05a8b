use crate::application::ports::{FeedGateway, StoryGateway};
use crate::domain::entities::{MediaSelection, Post, Story};
use crate::domain::value_objects::FeedScope;
use crate::shared::config::ApiConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// バックエンドREST APIのクライアント。セッションクッキーで認証する。
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(config: &ApiConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn scope_path(scope: &FeedScope) -> String {
        match scope {
            FeedScope::All => "/api/posts/all".to_string(),
            FeedScope::Following => "/api/posts/following".to_string(),
            FeedScope::User(username) => format!("/api/posts/user/{username}"),
            FeedScope::Likes(user_id) => format!("/api/posts/likes/{user_id}"),
        }
    }

    /// 非2xxをAppErrorへ写し、2xxは本文をデシリアライズする。
    /// エラー本文は `{"error": "..."}` 形式を想定し、外れたら生の本文を使う。
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        Err(Self::error_from(status, &response.text().await.unwrap_or_default()))
    }

    async fn expect_success(response: Response) -> Result<(), AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Self::error_from(status, &response.text().await.unwrap_or_default()))
    }

    fn error_from(status: StatusCode, body: &str) -> AppError {
        let message = Self::extract_error_message(body)
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(message),
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::BAD_REQUEST => AppError::Validation(message),
            _ => AppError::Server {
                status: status.as_u16(),
                message,
            },
        }
    }

    fn extract_error_message(body: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        value
            .get("error")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

#[async_trait]
impl FeedGateway for RestClient {
    async fn fetch_feed(&self, scope: &FeedScope) -> Result<Vec<Post>, AppError> {
        let path = Self::scope_path(scope);
        debug!(%path, "fetching feed");
        let response = self.http.get(self.url(&path)).send().await?;
        Self::decode(response).await
    }

    async fn like_post(&self, post_id: &str) -> Result<Vec<String>, AppError> {
        let response = self
            .http
            .post(self.url(&format!("/api/posts/like/{post_id}")))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn comment_post(&self, post_id: &str, text: &str) -> Result<Post, AppError> {
        let response = self
            .http
            .post(self.url(&format!("/api/posts/comment/{post_id}")))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/posts/{post_id}")))
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn follow_user(&self, user_id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url(&format!("/api/users/follow/{user_id}")))
            .send()
            .await?;
        Self::expect_success(response).await
    }
}

#[async_trait]
impl StoryGateway for RestClient {
    async fn fetch_story_feed(&self, user_id: &str) -> Result<Vec<Story>, AppError> {
        let response = self
            .http
            .get(self.url(&format!("/api/stories/feed/{user_id}")))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn fetch_user_stories(&self, user_id: &str) -> Result<Vec<Story>, AppError> {
        let response = self
            .http
            .get(self.url(&format!("/api/stories/user/{user_id}")))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn upload_story(
        &self,
        user_id: &str,
        selection: &MediaSelection,
    ) -> Result<Story, AppError> {
        let media = Part::bytes(selection.data.clone())
            .file_name(selection.file_name.clone())
            .mime_str(&selection.mime_type)
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let form = Form::new()
            .part("media", media)
            .text("type", selection.media_type().as_str().to_string())
            .text("userId", user_id.to_string());

        let response = self
            .http
            .post(self.url("/api/stories"))
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn delete_story(&self, story_id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/stories/{story_id}")))
            .send()
            .await?;
        Self::expect_success(response).await
    }
}
