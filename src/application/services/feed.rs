use crate::application::ports::FeedGateway;
use crate::application::services::mutation::MutationPipeline;
use crate::domain::entities::{Comment, Post, UserSummary};
use crate::domain::value_objects::FeedScope;
use crate::infrastructure::cache::CacheStore;
use crate::shared::error::AppError;
use std::sync::Arc;
use tracing::debug;

/// 投稿フィードに対する操作（いいね・コメント・削除・フォロー）。
///
/// 書き込みはすべて MutationPipeline を通し、UI がリモート確定を待たずに
/// 変化を映せるようにする。読み取りと再取得（invalidate 後の収束）も持つ。
pub struct FeedService {
    gateway: Arc<dyn FeedGateway>,
    pipeline: MutationPipeline<Vec<Post>>,
}

impl FeedService {
    pub fn new(gateway: Arc<dyn FeedGateway>, store: Arc<CacheStore<Vec<Post>>>) -> Self {
        Self {
            gateway,
            pipeline: MutationPipeline::new(store),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore<Vec<Post>>> {
        self.pipeline.store()
    }

    /// フィードをサーバーから取り直してキャッシュへ反映する。
    /// invalidate 後の照合はこの経路で収束する。
    pub async fn refresh_feed(&self, scope: &FeedScope) -> Result<Vec<Post>, AppError> {
        let posts = self.gateway.fetch_feed(scope).await?;
        self.store().set(scope.cache_key(), posts.clone());
        Ok(posts)
    }

    /// いいねのトグル。自分のIDの所属だけを楽観的に反転し、
    /// サーバーが返す確定リストで当該投稿の likes を差し替える。
    pub async fn toggle_like(
        &self,
        scope: &FeedScope,
        post_id: &str,
        user_id: &str,
    ) -> Result<(), AppError> {
        let key = scope.cache_key();
        let liked_before = self
            .store()
            .get(&key)
            .and_then(|posts| {
                posts
                    .iter()
                    .find(|p| p.id == post_id)
                    .map(|p| p.has_liked(user_id))
            })
            .unwrap_or(false);
        debug!(post_id, user_id, liked_before, "toggling like");

        let patch_id = post_id.to_string();
        let patch_user = user_id.to_string();
        let reconcile_id = post_id.to_string();
        let revert_id = post_id.to_string();
        let revert_user = user_id.to_string();

        self.pipeline
            .mutate(
                key,
                move |posts| {
                    let mut posts = posts.unwrap_or_default();
                    if let Some(post) = posts.iter_mut().find(|p| p.id == patch_id) {
                        post.set_liked(&patch_user, !liked_before);
                    }
                    posts
                },
                self.gateway.like_post(post_id),
                move |mut posts, likes: &Vec<String>| {
                    if let Some(post) = posts.iter_mut().find(|p| p.id == reconcile_id) {
                        post.replace_likes(likes.clone());
                    }
                    Some(posts)
                },
                move |mut posts| {
                    if let Some(post) = posts.iter_mut().find(|p| p.id == revert_id) {
                        post.set_liked(&revert_user, liked_before);
                    }
                    posts
                },
            )
            .await?;
        Ok(())
    }

    /// コメント投稿。保留状態のコメントを楽観的に追記し、確定コメント
    /// （サーバー採番ID付き）は invalidate 後の再取得で取り込む。
    pub async fn add_comment(
        &self,
        scope: &FeedScope,
        post_id: &str,
        author: UserSummary,
        text: &str,
    ) -> Result<(), AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Comment text is required".into()));
        }

        let pending = Comment::pending(author, text);
        let local_id = pending.id.clone();
        let patch_id = post_id.to_string();
        let revert_id = post_id.to_string();

        self.pipeline
            .mutate(
                scope.cache_key(),
                move |posts| {
                    let mut posts = posts.unwrap_or_default();
                    if let Some(post) = posts.iter_mut().find(|p| p.id == patch_id) {
                        post.push_comment(pending);
                    }
                    posts
                },
                self.gateway.comment_post(post_id, text),
                |_, _: &Post| None,
                move |mut posts| {
                    if let Some(post) = posts.iter_mut().find(|p| p.id == revert_id) {
                        post.remove_comment(&local_id);
                    }
                    posts
                },
            )
            .await?;
        Ok(())
    }

    /// 投稿の削除。リストから楽観的に取り除き、失敗時は元の位置へ戻す。
    pub async fn delete_post(&self, scope: &FeedScope, post_id: &str) -> Result<(), AppError> {
        let key = scope.cache_key();
        let original_position = self
            .store()
            .get(&key)
            .and_then(|posts| posts.iter().position(|p| p.id == post_id));

        let patch_id = post_id.to_string();
        let removed: Arc<std::sync::Mutex<Option<Post>>> = Arc::new(std::sync::Mutex::new(None));
        let removed_for_patch = Arc::clone(&removed);

        self.pipeline
            .mutate(
                key,
                move |posts| {
                    let mut posts = posts.unwrap_or_default();
                    if let Some(index) = posts.iter().position(|p| p.id == patch_id) {
                        let post = posts.remove(index);
                        *removed_for_patch
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(post);
                    }
                    posts
                },
                self.gateway.delete_post(post_id),
                |_, _: &()| None,
                move |mut posts| {
                    let taken = removed
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .take();
                    if let Some(post) = taken {
                        let index = original_position.unwrap_or(posts.len()).min(posts.len());
                        posts.insert(index, post);
                    }
                    posts
                },
            )
            .await?;
        Ok(())
    }

    /// フォロー。楽観的パッチは無し。成功したらフォロー中フィードを
    /// stale にして次の表示で取り直させる。
    pub async fn follow_user(&self, user_id: &str) -> Result<(), AppError> {
        self.gateway.follow_user(user_id).await?;
        self.store().invalidate(&FeedScope::Following.cache_key());
        Ok(())
    }
}
