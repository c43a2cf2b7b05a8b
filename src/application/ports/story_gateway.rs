use crate::domain::entities::{MediaSelection, Story};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// ストーリーへのリモートI/Oポート。
#[async_trait]
pub trait StoryGateway: Send + Sync {
    /// 閲覧者のフィードに並ぶストーリー一覧（作者ごとの要約）
    async fn fetch_story_feed(&self, user_id: &str) -> Result<Vec<Story>, AppError>;

    /// 1ユーザーのストーリーを作成順（古いものが先頭）で取得
    async fn fetch_user_stories(&self, user_id: &str) -> Result<Vec<Story>, AppError>;

    /// 新しいメディアを投稿し、作成されたストーリーを返す
    async fn upload_story(
        &self,
        user_id: &str,
        selection: &MediaSelection,
    ) -> Result<Story, AppError>;

    /// ストーリーの削除
    async fn delete_story(&self, story_id: &str) -> Result<(), AppError>;
}
