use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::DeliveryError;

// Hub Configuration
pub const DEFAULT_SHARD_COUNT: usize = 32;
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    fn shard_index(&self, shard_count: usize) -> usize {
        (self.0.as_u128() % shard_count as u128) as usize
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    async fn deliver(&self, message: &[u8]) -> Result<(), DeliveryError>;

    // Called once the hub has dropped this subscriber after a failed delivery.
    fn evicted(&self) {}
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub shard_count: usize,
    pub delivery_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

type Members = HashMap<SubscriberId, Arc<dyn Subscriber>>;

#[derive(Default)]
struct Shard {
    members: RwLock<Members>,
}

impl Shard {
    async fn deliver_all(&self, message: &[u8], timeout: Duration) {
        let failed: Vec<SubscriberId> = {
            let members = self.members.read().await;
            if members.is_empty() {
                return;
            }

            let results = join_all(members.values().map(|sub| async move {
                let outcome = match tokio::time::timeout(timeout, sub.deliver(message)).await {
                    Ok(result) => result,
                    Err(_) => Err(DeliveryError::Timeout(timeout)),
                };
                (sub.id(), outcome)
            }))
            .await;

            results
                .into_iter()
                .filter_map(|(id, outcome)| match outcome {
                    Ok(()) => None,
                    Err(e) => {
                        debug!("Delivery to subscriber {} failed, dropping it: {}", id, e);
                        Some(id)
                    }
                })
                .collect()
        };

        if failed.is_empty() {
            return;
        }

        let evicted: Vec<Arc<dyn Subscriber>> = {
            let mut members = self.members.write().await;
            failed.iter().filter_map(|id| members.remove(id)).collect()
        };
        for subscriber in evicted {
            subscriber.evicted();
        }
    }
}

// Every shard finishes a message before the next is dispatched, so all
// subscribers see one total order.
pub struct Hub {
    shards: Vec<Arc<Shard>>,
    delivery_timeout: Duration,
    ingress: mpsc::Sender<Arc<[u8]>>,
    queue: Mutex<Option<mpsc::Receiver<Arc<[u8]>>>>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let shard_count = config.shard_count.max(1);
        // Capacity 1 is the closest thing to an unbuffered hand-off.
        let (ingress, queue) = mpsc::channel(1);

        Self {
            shards: (0..shard_count).map(|_| Arc::new(Shard::default())).collect(),
            delivery_timeout: config.delivery_timeout,
            ingress,
            queue: Mutex::new(Some(queue)),
        }
    }

    fn shard_for(&self, id: &SubscriberId) -> &Shard {
        &self.shards[id.shard_index(self.shards.len())]
    }

    pub async fn register(&self, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.id();
        self.shard_for(&id).members.write().await.insert(id, subscriber);
    }

    pub async fn unregister(&self, id: &SubscriberId) {
        self.shard_for(id).members.write().await.remove(id);
    }

    pub async fn broadcast(&self, message: Vec<u8>) {
        if self.ingress.send(Arc::from(message)).await.is_err() {
            debug!("Dispatch loop is not running, dropping broadcast");
        }
    }

    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.members.read().await.len();
        }
        total
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let queue = self.queue.lock().take();
        let Some(mut queue) = queue else {
            warn!("Hub dispatch loop already started");
            return;
        };

        info!("Hub dispatch loop started with {} shards", self.shards.len());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = queue.recv() => match next {
                    Some(message) => self.dispatch(message).await,
                    None => break,
                },
            }
        }

        info!("Hub dispatch loop stopped");
    }

    async fn dispatch(&self, message: Arc<[u8]>) {
        let mut tasks = JoinSet::new();

        for shard in &self.shards {
            let shard = shard.clone();
            let message = message.clone();
            let timeout = self.delivery_timeout;
            tasks.spawn(async move { shard.deliver_all(&message, timeout).await });
        }

        // Barrier: the next message waits for every shard.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Shard delivery task failed: {}", e);
            }
        }
    }
}
