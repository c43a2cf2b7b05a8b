use super::user::UserSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    pub user: UserSummary,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub img: Option<String>,
    /// いいねしたユーザーIDの集合。同じIDは高々1回しか現れない。
    #[serde(default)]
    pub likes: Vec<String>,
    /// 表示順 = 挿入順。クライアント側からは追記のみ。
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn has_liked(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }

    /// いいね集合の所属を指定の側に揃える。重複は作らない。
    pub fn set_liked(&mut self, user_id: &str, liked: bool) {
        if liked {
            if !self.has_liked(user_id) {
                self.likes.push(user_id.to_string());
            }
        } else {
            self.likes.retain(|id| id != user_id);
        }
    }

    pub fn replace_likes(&mut self, likes: Vec<String>) {
        self.likes = likes;
    }

    pub fn push_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    pub fn remove_comment(&mut self, comment_id: &str) -> bool {
        let before = self.comments.len();
        self.comments.retain(|c| c.id != comment_id);
        self.comments.len() != before
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub user: UserSummary,
    pub text: String,
    /// サーバー未確定の楽観的コメントであることを示すローカルタグ。
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

impl Comment {
    /// サーバー確定前の保留コメントを作る。IDはローカル採番。
    pub fn pending(user: UserSummary, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user,
            text: text.into(),
            pending: true,
        }
    }
}
