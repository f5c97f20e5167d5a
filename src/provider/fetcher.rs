use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::data::{Hub, PriceReading, TtlStore};
use crate::errors::SourceError;

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self) -> Result<PriceReading, SourceError>;
}

pub trait PriceSink: Send + Sync {
    fn add(&self, reading: PriceReading);
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, message: Vec<u8>);
}

impl PriceSink for TtlStore<PriceReading> {
    fn add(&self, reading: PriceReading) {
        TtlStore::add(self, reading);
    }
}

#[async_trait]
impl Broadcaster for Hub {
    async fn broadcast(&self, message: Vec<u8>) {
        Hub::broadcast(self, message).await;
    }
}

pub struct PriceFetcher {
    store: Arc<dyn PriceSink>,
    source: Arc<dyn PriceSource>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl PriceFetcher {
    pub fn new(
        store: Arc<dyn PriceSink>,
        source: Arc<dyn PriceSource>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            store,
            source,
            broadcaster,
        }
    }

    pub fn start(self: Arc<Self>, cancel: CancellationToken, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(self.poll(cancel, interval))
    }

    async fn poll(self: Arc<Self>, cancel: CancellationToken, interval: Duration) {
        let period = interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Price fetcher polling every {:?}", period);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        info!("Price fetcher stopped");
    }

    async fn tick(&self) {
        let reading = match self.source.fetch_price().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("error fetching price: {}", e);
                return;
            }
        };

        self.store.add(reading.clone());

        match reading.to_json() {
            Ok(message) => {
                debug!("Broadcasting price {} @ {}", reading.price_usd, reading.timestamp);
                self.broadcaster.broadcast(message).await;
            }
            Err(e) => {
                error!("Failed to serialize price reading: {}", e);
            }
        }
    }
}
