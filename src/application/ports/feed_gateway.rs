use crate::domain::entities::Post;
use crate::domain::value_objects::FeedScope;
use crate::shared::error::AppError;
use async_trait::async_trait;

/// 投稿フィードへのリモートI/Oポート。
#[async_trait]
pub trait FeedGateway: Send + Sync {
    /// スコープに対応するフィードを取得（表示順）
    async fn fetch_feed(&self, scope: &FeedScope) -> Result<Vec<Post>, AppError>;

    /// いいねのトグル。サーバー確定後のいいねIDリストを返す
    async fn like_post(&self, post_id: &str) -> Result<Vec<String>, AppError>;

    /// コメント投稿。サーバー確定後の投稿を返す
    async fn comment_post(&self, post_id: &str, text: &str) -> Result<Post, AppError>;

    /// 投稿の削除
    async fn delete_post(&self, post_id: &str) -> Result<(), AppError>;

    /// ユーザーのフォロー
    async fn follow_user(&self, user_id: &str) -> Result<(), AppError>;
}
