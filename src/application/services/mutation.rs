use crate::domain::value_objects::CacheKey;
use crate::infrastructure::cache::CacheStore;
use crate::shared::error::AppError;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// 進行中の楽観的変更の記録。settle（成功・ロールバック）で破棄される。
pub struct OptimisticTransaction<T> {
    pub cache_key: CacheKey,
    /// パッチ適用前の値。エントリが無かった場合は None。
    pub snapshot: Option<T>,
    /// 楽観的パッチ適用直後のバージョン。
    pub applied_version: u64,
}

/// リモート書き込みを、ユーザー意図とキャッシュ表示が一致したまま実行する。
///
/// 手順: スナップショット → 楽観的適用 → リモート待ち → 照合または巻き戻し。
/// 同じキーへの変更が並行しても安全なよう、巻き戻しはバージョン比較で
/// スナップショット復元と「自分の分だけ戻す」を使い分ける。
pub struct MutationPipeline<T: Clone> {
    store: Arc<CacheStore<T>>,
}

impl<T: Clone> Clone for MutationPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<T> MutationPipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<CacheStore<T>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<CacheStore<T>> {
        &self.store
    }

    /// 楽観的変更つきのリモート書き込み。
    ///
    /// * `patch` — 現在値（無ければ None）からユーザー意図を反映した値を作る。
    ///   リモート待ちに入る前に `set` される。
    /// * `remote` — リモート呼び出し。成功値 `R` は `reconcile` に渡される。
    /// * `reconcile` — settle 時点の現在値とリモート結果から正準値を作る。
    ///   None なら楽観的値を維持する。いずれの場合も最後に invalidate して、
    ///   並行して起きた他者の変更はバックグラウンド再取得で収束させる。
    /// * `scoped_revert` — 失敗時、この変更が持ち込んだ差分だけを取り除く。
    ///   スナップショット取得後に別の変更が同じキーに触れていた場合、
    ///   古いスナップショットでの上書きは行わずこちらを適用する。
    pub async fn mutate<R, P, Rc, Rv, Fut>(
        &self,
        key: CacheKey,
        patch: P,
        remote: Fut,
        reconcile: Rc,
        scoped_revert: Rv,
    ) -> Result<R, AppError>
    where
        P: FnOnce(Option<T>) -> T,
        Rc: FnOnce(T, &R) -> Option<T>,
        Rv: FnOnce(T) -> T,
        Fut: Future<Output = Result<R, AppError>>,
    {
        let snapshot = self.store.get(&key);
        let patched = patch(snapshot.clone());
        self.store.set(key.clone(), patched);

        let tx = OptimisticTransaction {
            cache_key: key.clone(),
            snapshot,
            applied_version: self.store.version(&key),
        };

        match remote.await {
            Ok(result) => {
                if let Some(current) = self.store.get(&tx.cache_key) {
                    if let Some(canonical) = reconcile(current, &result) {
                        self.store.set(tx.cache_key.clone(), canonical);
                    }
                }
                // 並行する他者の変更とのずれは再取得で収束させる
                self.store.invalidate(&tx.cache_key);
                debug!(key = %tx.cache_key, "mutation settled");
                Ok(result)
            }
            Err(err) => {
                let current_version = self.store.version(&tx.cache_key);
                if current_version == tx.applied_version {
                    // 自分以外は誰も触れていない。スナップショットをそのまま戻す
                    match tx.snapshot {
                        Some(previous) => self.store.set(tx.cache_key.clone(), previous),
                        None => {
                            if let Some(current) = self.store.get(&tx.cache_key) {
                                let reverted = scoped_revert(current);
                                self.store.set(tx.cache_key.clone(), reverted);
                            }
                        }
                    }
                } else if let Some(current) = self.store.get(&tx.cache_key) {
                    // 別の変更が先に進んでいる。古いスナップショットで上書きせず、
                    // 自分の楽観的差分だけを現在値から取り除く
                    let reverted = scoped_revert(current);
                    self.store.set(tx.cache_key.clone(), reverted);
                }
                warn!(key = %tx.cache_key, error = %err, "mutation rolled back");
                Err(err)
            }
        }
    }
}
