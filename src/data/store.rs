use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

// Store Configuration
pub const DEFAULT_STORE_CAPACITY: usize = 1024;
pub const DEFAULT_STORE_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct StoreConfig {
    pub capacity: usize,
    pub ttl: Duration,
    pub compaction_interval: Duration,
    pub clock: Clock,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_STORE_CAPACITY,
            ttl: DEFAULT_STORE_TTL,
            compaction_interval: DEFAULT_COMPACTION_INTERVAL,
            clock: Arc::new(Utc::now),
        }
    }
}

impl StoreConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = interval;
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }
}

struct StoredItem<T> {
    expires_at: DateTime<Utc>,
    data: T,
}

// Items share one TTL, so expiry order is insertion order and compaction is a
// single in-place retain pass.
pub struct TtlStore<T> {
    items: RwLock<Vec<StoredItem<T>>>,
    ttl: chrono::Duration,
    clock: Clock,
    cancel: CancellationToken,
}

impl<T> TtlStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(config: StoreConfig) -> Arc<Self> {
        Self::start(config, &CancellationToken::new())
    }

    pub fn start(config: StoreConfig, parent: &CancellationToken) -> Arc<Self> {
        let ttl = chrono::Duration::from_std(config.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));

        let store = Arc::new(Self {
            items: RwLock::new(Vec::with_capacity(config.capacity)),
            ttl,
            clock: config.clock,
            cancel: parent.child_token(),
        });

        Self::spawn_compaction(Arc::downgrade(&store), store.cancel.clone(), config.compaction_interval);
        store
    }

    pub fn add(&self, item: T) {
        let expires_at = (self.clock)()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.items.write().push(StoredItem { expires_at, data: item });
    }

    // Expired items are skipped even before compaction reclaims them
    pub fn query(&self, filter: Option<&dyn Fn(&T) -> bool>) -> Vec<T> {
        let items = self.items.read();
        let now = (self.clock)();

        items
            .iter()
            .filter(|item| item.expires_at > now)
            .filter(|item| filter.map_or(true, |f| f(&item.data)))
            .map(|item| item.data.clone())
            .collect()
    }

    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping store compaction");
        }
        self.cancel.cancel();
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn compact(&self) -> usize {
        let mut items = self.items.write();
        let now = (self.clock)();
        let before = items.len();

        items.retain(|item| item.expires_at > now);

        before - items.len()
    }

    fn spawn_compaction(store: Weak<Self>, cancel: CancellationToken, period: Duration) {
        let period = period.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        let removed = store.compact();
                        if removed > 0 {
                            debug!("Compaction removed {} expired items ({} retained)", removed, store.len());
                        }
                    }
                }
            }

            debug!("Store compaction task exited");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn manual_clock() -> (Arc<AtomicI64>, impl Fn() -> DateTime<Utc> + Send + Sync + 'static) {
        let secs = Arc::new(AtomicI64::new(1_700_000_000));
        let handle = secs.clone();
        let clock = move || DateTime::<Utc>::from_timestamp(handle.load(Ordering::SeqCst), 0).unwrap();
        (secs, clock)
    }

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.capacity, 1024);
        assert_eq!(config.ttl, Duration::from_secs(600));
        assert_eq!(config.compaction_interval, Duration::from_secs(600));
    }

    #[test]
    fn test_store_config_builders() {
        let fixed = DateTime::<Utc>::from_timestamp(1_257_894_000, 0).unwrap();
        let config = StoreConfig::default()
            .with_capacity(2048)
            .with_ttl(Duration::from_secs(60))
            .with_compaction_interval(Duration::from_millis(1))
            .with_clock(move || fixed);

        assert_eq!(config.capacity, 2048);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.compaction_interval, Duration::from_millis(1));
        assert_eq!((config.clock)(), fixed);
    }

    #[tokio::test]
    async fn test_query_returns_insertion_order() {
        let store = TtlStore::new(StoreConfig::default());
        for i in [3, 1, 2] {
            store.add(i);
        }

        assert_eq!(store.query(None), vec![3, 1, 2]);
        assert_eq!(store.len(), 3);
        store.stop();
    }

    #[tokio::test]
    async fn test_query_skips_expired_without_compaction() {
        let (secs, clock) = manual_clock();
        let store = TtlStore::new(
            StoreConfig::default()
                .with_ttl(Duration::from_secs(10))
                .with_clock(clock),
        );

        store.add(1);
        secs.fetch_add(5, Ordering::SeqCst);
        store.add(2);

        // Exactly at the first item's expiration.
        secs.fetch_add(5, Ordering::SeqCst);
        assert_eq!(store.query(None), vec![2]);
        assert_eq!(store.len(), 2);
        store.stop();
    }

    #[tokio::test]
    async fn test_query_filters_expired_items_on_real_clock() {
        let store = TtlStore::new(
            StoreConfig::default()
                .with_ttl(Duration::from_millis(800))
                .with_compaction_interval(Duration::from_millis(800)),
        );

        store.add(1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        store.add(2);
        store.add(3);

        assert_eq!(store.query(Some(&|i: &i32| *i >= 2)), vec![2, 3]);
        store.stop();
    }

    #[tokio::test]
    async fn test_compact_keeps_only_live_items() {
        let (secs, clock) = manual_clock();
        let store = TtlStore::new(
            StoreConfig::default()
                .with_capacity(4)
                .with_ttl(Duration::from_secs(10))
                .with_clock(clock),
        );

        store.add("a");
        store.add("b");
        secs.fetch_add(6, Ordering::SeqCst);
        store.add("c");
        secs.fetch_add(6, Ordering::SeqCst);

        assert_eq!(store.compact(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.query(None), vec!["c"]);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_compaction_runs_on_interval() {
        let (secs, clock) = manual_clock();
        let store = TtlStore::new(
            StoreConfig::default()
                .with_ttl(Duration::from_secs(1))
                .with_compaction_interval(Duration::from_secs(60))
                .with_clock(clock),
        );

        store.add(1);
        secs.fetch_add(2, Ordering::SeqCst);
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(store.is_empty());
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_keeps_data() {
        let (secs, clock) = manual_clock();
        let store = TtlStore::new(
            StoreConfig::default()
                .with_ttl(Duration::from_secs(1))
                .with_compaction_interval(Duration::from_secs(60))
                .with_clock(clock),
        );

        store.add(1);
        store.stop();
        store.stop();

        secs.fetch_add(2, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(180)).await;

        // No compaction ran, but reads still hide the expired item.
        assert_eq!(store.len(), 1);
        assert!(store.query(None).is_empty());

        store.add(2);
        assert_eq!(store.query(None), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_compaction() {
        let (secs, clock) = manual_clock();
        let parent = CancellationToken::new();
        let store: Arc<TtlStore<u8>> = TtlStore::start(
            StoreConfig::default()
                .with_ttl(Duration::from_secs(1))
                .with_compaction_interval(Duration::from_secs(60))
                .with_clock(clock),
            &parent,
        );

        store.add(1);
        parent.cancel();
        assert!(store.cancel.is_cancelled());

        secs.fetch_add(2, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(180)).await;

        assert_eq!(store.len(), 1);
        assert!(store.query(None).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_query_and_compact() {
        let (secs, clock) = manual_clock();
        let store: Arc<TtlStore<u64>> = TtlStore::new(
            StoreConfig::default()
                .with_ttl(Duration::from_secs(5))
                .with_compaction_interval(Duration::from_millis(1))
                .with_clock(clock),
        );

        let writers: Vec<_> = (0..4u64)
            .map(|w| {
                let store = store.clone();
                let secs = secs.clone();
                tokio::spawn(async move {
                    for i in 0..500 {
                        store.add(w * 1_000 + i);
                        if i % 50 == 0 {
                            secs.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let items = store.query(None);
                    // Each writer's items must come back in the order it added them.
                    for w in 0..4u64 {
                        let own: Vec<u64> = items.iter().copied().filter(|v| v / 1_000 == w).collect();
                        assert!(own.windows(2).all(|pair| pair[0] < pair[1]));
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();

        assert!(store.len() <= 2_000);
        let live = store.query(None);
        assert!(!live.is_empty());
        assert!(live.len() <= store.len());

        secs.fetch_add(10, Ordering::SeqCst);
        assert!(store.query(None).is_empty());
        store.compact();
        assert!(store.is_empty());
        store.stop();
    }
}
