use crate::domain::value_objects::CacheKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::sync::Arc;

#[derive(Clone)]
struct CacheEntry<T> {
    value: T,
    version: u64,
    stale: bool,
}

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub type SubscriptionId = u64;

/// サーバー由来データのインメモリストア。
///
/// `set` のたびにキーごとの単調増加バージョンを進め、そのキーの購読者へ
/// 同期的に新しい値を通知する。ストア自身は取得方法を知らない。
/// `invalidate` は stale の印を付けるだけで、再取得は呼び出し側の責務。
pub struct CacheStore<T: Clone> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<T>>>,
    subscribers: RwLock<HashMap<CacheKey, Vec<(SubscriptionId, Subscriber<T>)>>>,
    next_subscription: AtomicU64,
}

impl<T: Clone> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> CacheStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// キーの現在バージョン。エントリが無いときは0。
    pub fn version(&self, key: &CacheKey) -> u64 {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).map(|entry| entry.version).unwrap_or(0)
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).map(|entry| entry.stale).unwrap_or(false)
    }

    /// 値を差し替え、バージョンを進めてから購読者へ同期通知する。
    /// 通知はロックを手放した上で購読順に行う。
    pub fn set(&self, key: CacheKey, value: T) {
        let notified = value.clone();
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let entry = entries.entry(key.clone()).or_insert(CacheEntry {
                value: value.clone(),
                version: 0,
                stale: false,
            });
            entry.value = value;
            entry.version += 1;
            entry.stale = false;
        }

        let handlers: Vec<Subscriber<T>> = {
            let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
            subscribers
                .get(&key)
                .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(&notified);
        }
    }

    /// エントリを stale にする。購読者への通知は、呼び出し側の再取得が
    /// `set` を通ったときに起きる。
    pub fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(key) {
            entry.stale = true;
        }
    }

    /// 購読登録。登録時点の値は配送されないので、必要なら直後に `get` する。
    pub fn subscribe(
        &self,
        key: CacheKey,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        subscribers
            .entry(key)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        for list in subscribers.values_mut() {
            list.retain(|(sub_id, _)| *sub_id != id);
        }
    }
}
