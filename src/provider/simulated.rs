use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;

use crate::data::store::Clock;
use crate::data::PriceReading;
use crate::errors::SourceError;
use crate::provider::fetcher::PriceSource;

pub const DEFAULT_SIMULATED_START_PRICE: i64 = 60_000;
// Largest move per fetch, in basis points
pub const DEFAULT_MAX_STEP_BPS: i64 = 25;

pub struct SimulatedSource {
    price: Mutex<Decimal>,
    max_step_bps: i64,
    clock: Clock,
}

impl SimulatedSource {
    pub fn new(start_price: Decimal, max_step_bps: i64) -> Self {
        Self {
            price: Mutex::new(start_price.round_dp(2)),
            max_step_bps: max_step_bps.abs(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    fn step(&self) -> Decimal {
        let bps = rand::thread_rng().gen_range(-self.max_step_bps..=self.max_step_bps);
        let factor = Decimal::ONE + Decimal::new(bps, 4);

        let mut price = self.price.lock();
        *price = (*price * factor).round_dp(2).max(Decimal::new(1, 2));
        *price
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new(Decimal::from(DEFAULT_SIMULATED_START_PRICE), DEFAULT_MAX_STEP_BPS)
    }
}

#[async_trait]
impl PriceSource for SimulatedSource {
    async fn fetch_price(&self) -> Result<PriceReading, SourceError> {
        let price = self.step();
        Ok(PriceReading::new(price, (self.clock)()))
    }
}
