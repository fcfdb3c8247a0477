//! Time-boxed snapshot of every eligible Take with single-flight reloads.
//!
//! The snapshot, its load time and the in-flight reload handle are the only
//! shared mutable state in the crate. They live together behind one mutex and
//! are replaced as a unit, so readers see either the old snapshot or the new
//! one. Concurrent misses all await the same reload; the store is queried once.
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::{Duration, Instant};

use crate::store::{CorpusStore, StoreError};
use crate::take::Take;

/// Immutable view of the eligible corpus at load time.
#[derive(Debug)]
pub struct CacheSnapshot {
    takes: Vec<Take>,
    loaded_at: Instant,
}

impl CacheSnapshot {
    #[must_use]
    pub fn new(takes: Vec<Take>) -> Self {
        Self {
            takes,
            loaded_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn takes(&self) -> &[Take] {
        &self.takes
    }

    #[must_use]
    pub const fn loaded_at(&self) -> Instant {
        self.loaded_at
    }

    #[must_use]
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Take> {
        self.takes.iter().find(|take| take.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.takes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.takes.is_empty()
    }
}

type ReloadResult = Result<Arc<CacheSnapshot>, StoreError>;
type Reload = Shared<BoxFuture<'static, ReloadResult>>;

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<CacheSnapshot>>,
    in_flight: Option<(u64, Reload)>,
    next_generation: u64,
}

impl CacheState {
    fn finish_reload(&mut self, generation: u64, result: &ReloadResult) {
        if matches!(self.in_flight, Some((current, _)) if current == generation) {
            self.in_flight = None;
        }
        if let Ok(snapshot) = result {
            self.snapshot = Some(Arc::clone(snapshot));
        }
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct CorpusCache<C: ?Sized> {
    store: Arc<C>,
    ttl: Duration,
    reload_timeout: Option<Duration>,
    state: Arc<Mutex<CacheState>>,
}

impl<C> CorpusCache<C>
where
    C: CorpusStore + ?Sized + 'static,
{
    #[must_use]
    pub fn new(store: Arc<C>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            reload_timeout: None,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Bound each reload so a hung store query clears the in-flight marker
    /// instead of parking every later caller on it.
    #[must_use]
    pub fn with_reload_timeout(mut self, timeout: Duration) -> Self {
        self.reload_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn store(&self) -> &Arc<C> {
        &self.store
    }

    /// Current eligible Takes, reloading from the store when the snapshot is
    /// missing or older than the TTL.
    ///
    /// # Errors
    ///
    /// Returns the reload's error to every caller that joined that reload.
    /// The failure is not cached: the next call starts a fresh reload.
    pub async fn get_takes(&self) -> ReloadResult {
        let reload = {
            let mut state = lock(&self.state);
            if let Some(snapshot) = state.snapshot.as_ref().filter(|s| s.is_fresh(self.ttl)) {
                return Ok(Arc::clone(snapshot));
            }
            if let Some((generation, reload)) = &state.in_flight {
                log::debug!("corpus cache miss joined reload #{generation}");
                reload.clone()
            } else {
                let generation = state.next_generation;
                state.next_generation += 1;
                let reload = self.start_reload(generation);
                state.in_flight = Some((generation, reload.clone()));
                reload
            }
        };
        reload.await
    }

    /// Snapshot currently held, fresh or not. Never touches the store.
    #[must_use]
    pub fn peek(&self) -> Option<Arc<CacheSnapshot>> {
        lock(&self.state).snapshot.clone()
    }

    /// Drop the snapshot so the next read reloads. An in-flight reload is left alone.
    pub fn invalidate(&self) {
        lock(&self.state).snapshot = None;
    }

    fn start_reload(&self, generation: u64) -> Reload {
        log::debug!("corpus cache starting reload #{generation}");
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let reload_timeout = self.reload_timeout;

        // The query runs as its own task so it completes and clears the marker
        // even if every waiter gives up first.
        let task = tokio::spawn(async move {
            let query = store.eligible_takes();
            let outcome = match reload_timeout {
                Some(limit) => tokio::time::timeout(limit, query)
                    .await
                    .unwrap_or(Err(StoreError::Timeout(limit))),
                None => query.await,
            };
            let result = outcome.map(|takes| Arc::new(CacheSnapshot::new(takes)));
            match &result {
                Ok(snapshot) => {
                    log::info!(
                        "corpus cache reload #{generation} loaded {} takes",
                        snapshot.len()
                    );
                }
                Err(err) => log::warn!("corpus cache reload #{generation} failed: {err}"),
            }
            lock(&state).finish_reload(generation, &result);
            result
        });

        let state = Arc::clone(&self.state);
        async move {
            task.await.unwrap_or_else(|join_err| {
                let result = Err(StoreError::Unavailable(format!(
                    "corpus reload task failed: {join_err}"
                )));
                lock(&state).finish_reload(generation, &result);
                result
            })
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryId;
    use crate::take::fixtures;
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct SlowStore {
        queries: AtomicUsize,
        failing: AtomicBool,
        delay: Duration,
    }

    impl SlowStore {
        fn new(delay: Duration) -> Self {
            Self {
                queries: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                delay,
            }
        }

        fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CorpusStore for SlowStore {
        async fn eligible_takes(&self) -> Result<Vec<Take>, StoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(fixtures::corpus().eligible().cloned().collect())
        }

        async fn take_by_id(&self, id: &str) -> Result<Option<Take>, StoreError> {
            Ok(fixtures::corpus().get_by_id(id).cloned())
        }

        async fn takes_by_category(&self, category: CategoryId) -> Result<Vec<Take>, StoreError> {
            Ok(fixtures::corpus()
                .takes
                .into_iter()
                .filter(|t| t.category == category)
                .collect())
        }
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_reload() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(50)));
        let cache = Arc::new(CorpusCache::new(Arc::clone(&store), Duration::from_secs(600)));

        let handles = (0..32).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_takes().await })
        });
        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(store.queries(), 1);
        let first = &results[0];
        assert_eq!(first.len(), 18);
        assert!(results.iter().all(|snap| Arc::ptr_eq(snap, first)));
    }

    #[tokio::test]
    async fn fresh_snapshot_served_without_io_until_ttl() {
        tokio::time::pause();
        let store = Arc::new(SlowStore::new(Duration::from_millis(1)));
        let cache = CorpusCache::new(Arc::clone(&store), Duration::from_secs(600));

        cache.get_takes().await.unwrap();
        tokio::time::advance(Duration::from_secs(599)).await;
        cache.get_takes().await.unwrap();
        assert_eq!(store.queries(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.get_takes().await.unwrap();
        assert_eq!(store.queries(), 2);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter_then_retries_fresh() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(20)));
        store.failing.store(true, Ordering::SeqCst);
        let cache = Arc::new(CorpusCache::new(Arc::clone(&store), Duration::from_secs(600)));

        let waiters = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_takes().await })
        });
        for joined in join_all(waiters).await {
            assert!(matches!(joined.unwrap(), Err(StoreError::Unavailable(_))));
        }
        assert_eq!(store.queries(), 1);
        assert!(cache.peek().is_none());

        store.failing.store(false, Ordering::SeqCst);
        let snapshot = cache.get_takes().await.unwrap();
        assert_eq!(snapshot.len(), 18);
        assert_eq!(store.queries(), 2);
    }

    #[tokio::test]
    async fn hung_reload_times_out_and_clears_marker() {
        tokio::time::pause();
        let store = Arc::new(SlowStore::new(Duration::from_secs(60)));
        let cache = CorpusCache::new(Arc::clone(&store), Duration::from_secs(600))
            .with_reload_timeout(Duration::from_secs(8));

        let err = cache.get_takes().await.unwrap_err();
        assert_eq!(err, StoreError::Timeout(Duration::from_secs(8)));

        let again = cache.get_takes().await.unwrap_err();
        assert_eq!(again, StoreError::Timeout(Duration::from_secs(8)));
        assert_eq!(store.queries(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(1)));
        let cache = CorpusCache::new(Arc::clone(&store), Duration::from_secs(600));
        let snapshot = cache.get_takes().await.unwrap();
        assert!(snapshot.find("money2").is_some());

        cache.invalidate();
        assert!(cache.peek().is_none());
        cache.get_takes().await.unwrap();
        assert_eq!(store.queries(), 2);
    }
}
