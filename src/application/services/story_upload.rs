use crate::application::ports::StoryGateway;
use crate::domain::entities::{MediaSelection, Story};
use crate::infrastructure::event::{topics, InvalidationBus};
use crate::shared::error::AppError;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// ストーリー投稿。メディア選択を保持し、アップロード成功時にだけ
/// 再取得シグナルを流す。失敗時は選択を保持したまま再試行に備える。
pub struct StoryUploadService {
    gateway: Arc<dyn StoryGateway>,
    bus: Arc<InvalidationBus>,
    auth_user_id: Option<String>,
    selection: Mutex<Option<MediaSelection>>,
}

impl StoryUploadService {
    pub fn new(
        gateway: Arc<dyn StoryGateway>,
        bus: Arc<InvalidationBus>,
        auth_user_id: Option<String>,
    ) -> Self {
        Self {
            gateway,
            bus,
            auth_user_id,
            selection: Mutex::new(None),
        }
    }

    pub fn select_media(&self, selection: MediaSelection) {
        debug!(file = %selection.file_name, mime = %selection.mime_type, "media selected");
        *self.lock_selection() = Some(selection);
    }

    pub fn selected(&self) -> Option<MediaSelection> {
        self.lock_selection().clone()
    }

    pub fn clear_selection(&self) {
        *self.lock_selection() = None;
    }

    /// 選択中のメディアをアップロードする。未ログイン・未選択のときは
    /// リモートへ出ずに失敗する。成功したら選択を消費して通知を流す。
    pub async fn upload(&self) -> Result<Story, AppError> {
        let user_id = self
            .auth_user_id
            .clone()
            .ok_or_else(|| AppError::Unauthorized("Log in to post a story".into()))?;
        let selection = self
            .selected()
            .ok_or_else(|| AppError::Validation("Select a media file first".into()))?;

        match self.gateway.upload_story(&user_id, &selection).await {
            Ok(story) => {
                self.clear_selection();
                self.bus.publish(topics::STORIES_REFRESH);
                debug!(story_id = %story.id, "story uploaded");
                Ok(story)
            }
            Err(err) => {
                // 選択は保持し、そのまま再試行できるようにする
                warn!(error = %err, "story upload failed");
                Err(err)
            }
        }
    }

    fn lock_selection(&self) -> std::sync::MutexGuard<'_, Option<MediaSelection>> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
