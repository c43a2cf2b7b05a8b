use std::fmt;

/// キャッシュ1単位を指す不透明な複合キー（リソース種別 + パラメータ）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: &'static str,
    param: Option<String>,
}

impl CacheKey {
    pub fn new(resource: &'static str, param: Option<String>) -> Self {
        Self { resource, param }
    }

    pub fn feed(scope: &FeedScope) -> Self {
        match scope {
            FeedScope::All => Self::new("posts", None),
            FeedScope::Following => Self::new("posts:following", None),
            FeedScope::User(username) => Self::new("posts:user", Some(username.clone())),
            FeedScope::Likes(user_id) => Self::new("posts:likes", Some(user_id.clone())),
        }
    }

}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Some(param) => write!(f, "{}:{param}", self.resource),
            None => f.write_str(self.resource),
        }
    }
}

/// 投稿フィードの取得範囲。キャッシュキーとエンドポイントの両方を決める。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedScope {
    All,
    Following,
    User(String),
    Likes(String),
}

impl FeedScope {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::feed(self)
    }
}
