use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::debug;

pub mod topics {
    /// どこかでストーリーが増減した。購読側は各自のスコープを再取得する。
    pub const STORIES_REFRESH: &str = "stories:refresh";
}

type Handler = Arc<dyn Fn() + Send + Sync>;

/// キャッシュキーを共有しないコンポーネント間の再取得シグナル用バス。
///
/// 配送はプロセス内・同期・ベストエフォート。publish 完了後に購読した
/// ハンドラへは届かない（遅延配送や再送は行わない）。ペイロードは持たず、
/// 購読側が常に自分のスコープを再取得する前提の契約。
pub struct InvalidationBus {
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 購読登録。返されたガードを drop すると解除される。
    pub fn subscribe(
        self: &Arc<Self>,
        topic: &str,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> BusSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(handler)));

        BusSubscription {
            bus: Arc::downgrade(self),
            topic: topic.to_string(),
            id,
        }
    }

    /// 現時点の購読者へ、購読順に同期配送してから戻る。
    pub fn publish(&self, topic: &str) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            handlers
                .get(topic)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        debug!(topic, subscribers = snapshot.len(), "publishing invalidation");
        for handler in snapshot {
            handler();
        }
    }

    fn unsubscribe(&self, topic: &str, id: u64) {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = handlers.get_mut(topic) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                handlers.remove(topic);
            }
        }
    }
}

/// 購読の生存期間を明示するガード。
pub struct BusSubscription {
    bus: Weak<InvalidationBus>,
    topic: String,
    id: u64,
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(&self.topic, self.id);
        }
    }
}
