use crate::application::ports::StoryGateway;
use crate::domain::entities::Story;
use crate::infrastructure::event::{topics, InvalidationBus};
use crate::shared::config::StoryConfig;
use crate::shared::error::AppError;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// ビューアのライフサイクル。Loading から始まり、Closed で終端する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Viewing { active_index: usize },
    Closed,
}

/// ビューアが解釈するキー入力。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    ArrowLeft,
    ArrowRight,
    Escape,
}

struct SessionInner {
    state: SessionState,
    items: Vec<Story>,
    /// ナビゲーション・クローズ・削除のたびに進む世代。古い世代の
    /// タイマー発火や取得結果はここで無効化される。
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

/// 1ユーザーのストーリーを順に見せるビューアセッション。
///
/// 自動送りのタイマーは常に1本。操作のたびに世代を進めて張り直すので、
/// 遅れて発火した古いタイマーが現在の表示を動かすことはない。
/// 最後の1件では張り直さない（自動では閉じない）。
pub struct StorySessionController {
    user_id: String,
    viewer_id: String,
    gateway: Arc<dyn StoryGateway>,
    bus: Arc<InvalidationBus>,
    advance_interval: Duration,
    inner: Mutex<SessionInner>,
}

impl StorySessionController {
    pub fn new(
        user_id: impl Into<String>,
        viewer_id: impl Into<String>,
        gateway: Arc<dyn StoryGateway>,
        bus: Arc<InvalidationBus>,
        config: &StoryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            user_id: user_id.into(),
            viewer_id: viewer_id.into(),
            gateway,
            bus,
            advance_interval: config.advance_interval(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Loading,
                items: Vec::new(),
                epoch: 0,
                timer: None,
            }),
        })
    }

    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    pub fn active_story(&self) -> Option<Story> {
        let inner = self.lock_inner();
        match inner.state {
            SessionState::Viewing { active_index } => inner.items.get(active_index).cloned(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.lock_inner().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_inner().items.is_empty()
    }

    /// セッションを開く。取得が空・失敗なら表示へ進まず閉じる。
    pub async fn open(self: &Arc<Self>) -> Result<(), AppError> {
        let opened_epoch = self.lock_inner().epoch;

        let fetched = self.gateway.fetch_user_stories(&self.user_id).await;

        let mut inner = self.lock_inner();
        if inner.epoch != opened_epoch || inner.state != SessionState::Loading {
            // 取得を待つ間に閉じられた。結果は捨てる
            return Ok(());
        }
        match fetched {
            Ok(items) if items.is_empty() => {
                debug!(user_id = %self.user_id, "no stories to show, closing");
                Self::close_locked(&mut inner);
                Ok(())
            }
            Ok(items) => {
                inner.items = items;
                inner.state = SessionState::Viewing { active_index: 0 };
                inner.epoch += 1;
                self.arm(&mut inner);
                Ok(())
            }
            Err(err) => {
                warn!(user_id = %self.user_id, error = %err, "story fetch failed, closing");
                Self::close_locked(&mut inner);
                Err(err)
            }
        }
    }

    /// 前のストーリーへ。先頭では動かない。
    pub fn prev(self: &Arc<Self>) {
        self.navigate(|index, _| index.checked_sub(1));
    }

    /// 次のストーリーへ。最後では動かない（自動でも手動でも閉じない）。
    pub fn next(self: &Arc<Self>) {
        self.navigate(|index, len| (index + 1 < len).then_some(index + 1));
    }

    pub fn handle_key(self: &Arc<Self>, key: KeyInput) {
        match key {
            KeyInput::ArrowLeft => self.prev(),
            KeyInput::ArrowRight => self.next(),
            KeyInput::Escape => self.close(),
        }
    }

    /// セッションを閉じてタイマーを止める。以後の操作はすべて無視される。
    pub fn close(&self) {
        let mut inner = self.lock_inner();
        Self::close_locked(&mut inner);
    }

    /// 表示中のストーリーを削除する。所有者以外は拒否し、リモートへは出ない。
    /// 成功したらインデックスを詰め、他コンポーネントへ再取得を促す。
    pub async fn delete_active(self: &Arc<Self>) -> Result<(), AppError> {
        let story = {
            let inner = self.lock_inner();
            let SessionState::Viewing { active_index } = inner.state else {
                return Err(AppError::Validation("No story is being viewed".into()));
            };
            let story = inner
                .items
                .get(active_index)
                .cloned()
                .ok_or_else(|| AppError::Internal("active index out of range".into()))?;
            if !story.is_owned_by(&self.viewer_id) {
                return Err(AppError::Unauthorized(
                    "Only the owner can delete a story".into(),
                ));
            }
            story
        };

        self.gateway.delete_story(&story.id).await?;

        {
            let mut inner = self.lock_inner();
            if let SessionState::Viewing { active_index } = inner.state {
                inner.items.retain(|s| s.id != story.id);
                inner.epoch += 1;
                if inner.items.is_empty() {
                    Self::close_locked(&mut inner);
                } else {
                    let clamped = active_index.min(inner.items.len() - 1);
                    inner.state = SessionState::Viewing {
                        active_index: clamped,
                    };
                    self.arm(&mut inner);
                }
            }
        }

        // ロックの外から通知する。ハンドラが同期で走るため
        self.bus.publish(topics::STORIES_REFRESH);
        debug!(story_id = %story.id, "story deleted");
        Ok(())
    }

    fn navigate(self: &Arc<Self>, step: impl FnOnce(usize, usize) -> Option<usize>) {
        let mut inner = self.lock_inner();
        if let SessionState::Viewing { active_index } = inner.state {
            if let Some(target) = step(active_index, inner.items.len()) {
                inner.state = SessionState::Viewing {
                    active_index: target,
                };
                inner.epoch += 1;
                self.arm(&mut inner);
            }
        }
    }

    /// 自動送りの発火。張られた時点の世代と一致するときだけ進む。
    fn tick(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.lock_inner();
        if inner.epoch != epoch {
            return;
        }
        if let SessionState::Viewing { active_index } = inner.state {
            if active_index + 1 < inner.items.len() {
                inner.state = SessionState::Viewing {
                    active_index: active_index + 1,
                };
                inner.epoch += 1;
                self.arm(&mut inner);
            }
        }
    }

    fn arm(self: &Arc<Self>, inner: &mut SessionInner) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        let epoch = inner.epoch;
        let interval = self.advance_interval;
        let controller = Arc::downgrade(self);
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(controller) = controller.upgrade() {
                controller.tick(epoch);
            }
        }));
    }

    fn close_locked(inner: &mut SessionInner) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.epoch += 1;
        inner.state = SessionState::Closed;
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StorySessionController {
    fn drop(&mut self) {
        if let Some(timer) = self.lock_inner().timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{MediaSelection, MediaType, UserSummary};
    use async_trait::async_trait;

    struct TestStoryGateway {
        stories: tokio::sync::Mutex<Result<Vec<Story>, AppError>>,
        delete_calls: tokio::sync::Mutex<Vec<String>>,
        fetch_gate: tokio::sync::Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
    }

    impl TestStoryGateway {
        fn with_stories(stories: Vec<Story>) -> Arc<Self> {
            Arc::new(Self {
                stories: tokio::sync::Mutex::new(Ok(stories)),
                delete_calls: tokio::sync::Mutex::new(Vec::new()),
                fetch_gate: tokio::sync::Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                stories: tokio::sync::Mutex::new(Err(AppError::Network("offline".into()))),
                delete_calls: tokio::sync::Mutex::new(Vec::new()),
                fetch_gate: tokio::sync::Mutex::new(None),
            })
        }

        async fn gate_next_fetch(&self) -> tokio::sync::oneshot::Sender<()> {
            let (tx, rx) = tokio::sync::oneshot::channel();
            *self.fetch_gate.lock().await = Some(rx);
            tx
        }
    }

    #[async_trait]
    impl StoryGateway for TestStoryGateway {
        async fn fetch_story_feed(&self, _user_id: &str) -> Result<Vec<Story>, AppError> {
            self.stories.lock().await.clone()
        }

        async fn fetch_user_stories(&self, _user_id: &str) -> Result<Vec<Story>, AppError> {
            let gate = self.fetch_gate.lock().await.take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.stories.lock().await.clone()
        }

        async fn upload_story(
            &self,
            _user_id: &str,
            _selection: &MediaSelection,
        ) -> Result<Story, AppError> {
            Err(AppError::Internal("not used".into()))
        }

        async fn delete_story(&self, story_id: &str) -> Result<(), AppError> {
            self.delete_calls.lock().await.push(story_id.to_string());
            Ok(())
        }
    }

    fn story(id: &str, owner: &str) -> Story {
        Story {
            id: id.into(),
            user: UserSummary::new(owner, owner),
            media_url: format!("https://cdn.example/{id}.jpg"),
            media_type: MediaType::Image,
            caption: None,
            created_at: None,
        }
    }

    fn controller(
        stories: Vec<Story>,
        viewer_id: &str,
    ) -> (Arc<StorySessionController>, Arc<TestStoryGateway>, Arc<InvalidationBus>) {
        let gateway = TestStoryGateway::with_stories(stories);
        let bus = Arc::new(InvalidationBus::new());
        let controller = StorySessionController::new(
            "owner",
            viewer_id,
            Arc::clone(&gateway) as Arc<dyn StoryGateway>,
            Arc::clone(&bus),
            &StoryConfig::default(),
        );
        (controller, gateway, bus)
    }

    #[tokio::test]
    async fn open_starts_viewing_first_story() {
        let (controller, _, _) = controller(vec![story("s1", "owner"), story("s2", "owner")], "viewer");
        controller.open().await.unwrap();
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 0 });
        assert_eq!(controller.active_story().unwrap().id, "s1");
    }

    #[tokio::test]
    async fn empty_feed_closes_without_viewing() {
        let (controller, _, _) = controller(Vec::new(), "viewer");
        controller.open().await.unwrap();
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn fetch_failure_closes_session() {
        let gateway = TestStoryGateway::failing();
        let bus = Arc::new(InvalidationBus::new());
        let controller = StorySessionController::new(
            "owner",
            "viewer",
            Arc::clone(&gateway) as Arc<dyn StoryGateway>,
            bus,
            &StoryConfig::default(),
        );

        let err = controller.open().await.unwrap_err();
        assert!(matches!(err, AppError::Network(_)));
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_advances_then_stops_at_last_story() {
        let (controller, _, _) = controller(
            vec![story("s1", "owner"), story("s2", "owner"), story("s3", "owner")],
            "viewer",
        );
        controller.open().await.unwrap();

        tokio::time::sleep(Duration::from_millis(5010)).await;
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 1 });

        tokio::time::sleep(Duration::from_millis(5010)).await;
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 2 });

        // 最後の1件。いくら待っても進まず、閉じもしない
        tokio::time::sleep(Duration::from_millis(20000)).await;
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn configured_interval_drives_auto_advance() {
        let gateway =
            TestStoryGateway::with_stories(vec![story("s1", "owner"), story("s2", "owner")]);
        let bus = Arc::new(InvalidationBus::new());
        let config = StoryConfig {
            advance_interval_ms: 1000,
            ..StoryConfig::default()
        };
        let controller = StorySessionController::new(
            "owner",
            "viewer",
            Arc::clone(&gateway) as Arc<dyn StoryGateway>,
            bus,
            &config,
        );
        controller.open().await.unwrap();

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 0 });

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn manual_navigation_resets_timer() {
        let (controller, _, _) = controller(
            vec![story("s1", "owner"), story("s2", "owner"), story("s3", "owner")],
            "viewer",
        );
        controller.open().await.unwrap();

        // タイマー満了の直前に手動で進めると、満了は次の周期まで延びる
        tokio::time::sleep(Duration::from_millis(4900)).await;
        controller.next();
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 1 });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 1 });

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 2 });
    }

    #[tokio::test]
    async fn navigation_clamps_at_both_ends() {
        let (controller, _, _) = controller(vec![story("s1", "owner"), story("s2", "owner")], "viewer");
        controller.open().await.unwrap();

        controller.prev();
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 0 });

        controller.next();
        controller.next();
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 1 });
    }

    #[tokio::test]
    async fn escape_key_closes_session() {
        let (controller, _, _) = controller(vec![story("s1", "owner")], "viewer");
        controller.open().await.unwrap();

        controller.handle_key(KeyInput::ArrowRight);
        controller.handle_key(KeyInput::Escape);
        assert_eq!(controller.state(), SessionState::Closed);

        // 閉じた後の入力は無視される
        controller.handle_key(KeyInput::ArrowLeft);
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn delete_requires_ownership() {
        let (controller, gateway, _) = controller(vec![story("s1", "owner")], "someone_else");
        controller.open().await.unwrap();

        let err = controller.delete_active().await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(gateway.delete_calls.lock().await.is_empty());
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 0 });
    }

    #[tokio::test]
    async fn delete_clamps_index_and_publishes_refresh() {
        let (controller, gateway, bus) = controller(
            vec![story("s1", "owner"), story("s2", "owner")],
            "owner",
        );
        let published = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&published);
        let _sub = bus.subscribe(topics::STORIES_REFRESH, move || {
            *counter.lock().unwrap() += 1
        });

        controller.open().await.unwrap();
        controller.next();
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 1 });

        controller.delete_active().await.unwrap();

        assert_eq!(*gateway.delete_calls.lock().await, vec!["s2".to_string()]);
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 0 });
        assert_eq!(controller.active_story().unwrap().id, "s1");
        assert_eq!(*published.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn deleting_last_story_closes_session() {
        let (controller, _, bus) = controller(vec![story("s1", "owner")], "owner");
        let published = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&published);
        let _sub = bus.subscribe(topics::STORIES_REFRESH, move || {
            *counter.lock().unwrap() += 1
        });

        controller.open().await.unwrap();
        controller.delete_active().await.unwrap();

        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(*published.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn fetch_resolving_after_close_cannot_reopen_session() {
        let (controller, gateway, _) = controller(vec![story("s1", "owner")], "viewer");
        let gate = gateway.gate_next_fetch().await;

        let opening = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.open().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        controller.close();
        gate.send(()).unwrap();
        opening.await.unwrap().unwrap();

        // 取得が遅れて解決しても閉じたセッションは動かない
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn stale_timer_epoch_cannot_move_session() {
        let (controller, _, _) = controller(vec![story("s1", "owner"), story("s2", "owner")], "viewer");
        controller.open().await.unwrap();
        let stale_epoch = controller.lock_inner().epoch;

        controller.next();
        controller.tick(stale_epoch);
        assert_eq!(controller.state(), SessionState::Viewing { active_index: 1 });

        controller.close();
        controller.tick(stale_epoch);
        assert_eq!(controller.state(), SessionState::Closed);
    }
}
