use crate::application::ports::StoryGateway;
use crate::domain::entities::Story;
use crate::infrastructure::event::{topics, BusSubscription, InvalidationBus};
use crate::shared::config::StoryConfig;
use crate::shared::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::{debug, warn};

/// フィード上部のストーリー一覧。バスの再取得シグナルを受けて
/// stale を立て、次の表示タイミングで取り直す。
pub struct StoryBarService {
    gateway: Arc<dyn StoryGateway>,
    viewer_id: String,
    feed_limit: usize,
    entries: RwLock<Vec<Story>>,
    stale: AtomicBool,
}

impl StoryBarService {
    pub fn new(
        gateway: Arc<dyn StoryGateway>,
        viewer_id: impl Into<String>,
        config: &StoryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            viewer_id: viewer_id.into(),
            feed_limit: config.feed_limit as usize,
            entries: RwLock::new(Vec::new()),
            // 初回表示で必ず取得させる
            stale: AtomicBool::new(true),
        })
    }

    pub fn entries(&self) -> Vec<Story> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// フィードを取り直す。失敗したら手持ちの一覧を保ち、stale のままにする。
    pub async fn refresh(&self) -> Result<Vec<Story>, AppError> {
        match self.gateway.fetch_story_feed(&self.viewer_id).await {
            Ok(mut stories) => {
                // バーに並べるのは設定の上限まで
                stories.truncate(self.feed_limit);
                *self
                    .entries
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = stories.clone();
                self.stale.store(false, Ordering::Release);
                debug!(count = stories.len(), "story bar refreshed");
                Ok(stories)
            }
            Err(err) => {
                warn!(error = %err, "story bar refresh failed");
                Err(err)
            }
        }
    }

    /// stale のときだけ取り直す。取り直したら Some を返す。
    pub async fn refresh_if_stale(&self) -> Result<Option<Vec<Story>>, AppError> {
        if !self.is_stale() {
            return Ok(None);
        }
        self.refresh().await.map(Some)
    }

    /// バスへつなぐ。シグナルを受けると stale を立てるだけで、
    /// 取得は次の refresh_if_stale に任せる。
    pub fn attach(self: &Arc<Self>, bus: &Arc<InvalidationBus>) -> BusSubscription {
        let weak: Weak<Self> = Arc::downgrade(self);
        bus.subscribe(topics::STORIES_REFRESH, move || {
            if let Some(bar) = weak.upgrade() {
                bar.mark_stale();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{MediaSelection, MediaType, UserSummary};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct TestStoryGateway {
        stories: tokio::sync::Mutex<Result<Vec<Story>, AppError>>,
        fetch_count: AtomicU32,
    }

    impl TestStoryGateway {
        fn with_stories(stories: Vec<Story>) -> Arc<Self> {
            Arc::new(Self {
                stories: tokio::sync::Mutex::new(Ok(stories)),
                fetch_count: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl StoryGateway for TestStoryGateway {
        async fn fetch_story_feed(&self, _user_id: &str) -> Result<Vec<Story>, AppError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            self.stories.lock().await.clone()
        }

        async fn fetch_user_stories(&self, _user_id: &str) -> Result<Vec<Story>, AppError> {
            Ok(Vec::new())
        }

        async fn upload_story(
            &self,
            _user_id: &str,
            _selection: &MediaSelection,
        ) -> Result<Story, AppError> {
            Err(AppError::Internal("not used".into()))
        }

        async fn delete_story(&self, _story_id: &str) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn story(id: &str) -> Story {
        Story {
            id: id.into(),
            user: UserSummary::new("u1", "alice"),
            media_url: format!("https://cdn.example/{id}.jpg"),
            media_type: MediaType::Image,
            caption: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn starts_stale_and_clears_after_refresh() {
        let gateway = TestStoryGateway::with_stories(vec![story("s1")]);
        let bar = StoryBarService::new(
            Arc::clone(&gateway) as Arc<dyn StoryGateway>,
            "viewer",
            &StoryConfig::default(),
        );

        assert!(bar.is_stale());
        let refreshed = bar.refresh_if_stale().await.unwrap();
        assert_eq!(refreshed.unwrap().len(), 1);
        assert!(!bar.is_stale());

        // stale でなければ取りに行かない
        assert!(bar.refresh_if_stale().await.unwrap().is_none());
        assert_eq!(gateway.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_caps_entries_at_feed_limit() {
        let gateway =
            TestStoryGateway::with_stories(vec![story("s1"), story("s2"), story("s3")]);
        let config = StoryConfig {
            feed_limit: 2,
            ..StoryConfig::default()
        };
        let bar = StoryBarService::new(
            Arc::clone(&gateway) as Arc<dyn StoryGateway>,
            "viewer",
            &config,
        );

        let refreshed = bar.refresh().await.unwrap();

        let ids: Vec<_> = refreshed.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(bar.entries().len(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_entries() {
        let gateway = TestStoryGateway::with_stories(vec![story("s1")]);
        let bar = StoryBarService::new(
            Arc::clone(&gateway) as Arc<dyn StoryGateway>,
            "viewer",
            &StoryConfig::default(),
        );
        bar.refresh().await.unwrap();

        *gateway.stories.lock().await = Err(AppError::Network("offline".into()));
        bar.mark_stale();
        let err = bar.refresh_if_stale().await.unwrap_err();

        assert!(matches!(err, AppError::Network(_)));
        assert_eq!(bar.entries().len(), 1);
        assert!(bar.is_stale());
    }

    #[tokio::test]
    async fn bus_signal_marks_stale_without_fetching() {
        let gateway = TestStoryGateway::with_stories(vec![story("s1")]);
        let bus = Arc::new(InvalidationBus::new());
        let bar = StoryBarService::new(
            Arc::clone(&gateway) as Arc<dyn StoryGateway>,
            "viewer",
            &StoryConfig::default(),
        );
        let _sub = bar.attach(&bus);
        bar.refresh().await.unwrap();
        assert!(!bar.is_stale());

        bus.publish(topics::STORIES_REFRESH);

        assert!(bar.is_stale());
        // シグナル自体は取得を起こさない
        assert_eq!(gateway.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn detached_bar_ignores_signals() {
        let gateway = TestStoryGateway::with_stories(Vec::new());
        let bus = Arc::new(InvalidationBus::new());
        let bar = StoryBarService::new(
            Arc::clone(&gateway) as Arc<dyn StoryGateway>,
            "viewer",
            &StoryConfig::default(),
        );
        let sub = bar.attach(&bus);
        bar.refresh().await.unwrap();

        drop(sub);
        bus.publish(topics::STORIES_REFRESH);

        assert!(!bar.is_stale());
    }
}
