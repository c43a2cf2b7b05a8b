use super::user::UserSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }
}

/// 作成順で並ぶ、期限付きのストーリー1件。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    #[serde(rename = "_id")]
    pub id: String,
    pub user: UserSummary,
    pub media_url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Story {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user.id == user_id
    }
}

/// アップロード前にローカルで保持するメディア選択。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSelection {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl MediaSelection {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// MIMEからメディア種別を導出する。video/* 以外はすべて画像扱い。
    pub fn media_type(&self) -> MediaType {
        if self.mime_type.starts_with("video") {
            MediaType::Video
        } else {
            MediaType::Image
        }
    }
}
