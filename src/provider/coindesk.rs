use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::data::store::Clock;
use crate::data::PriceReading;
use crate::errors::SourceError;
use crate::provider::fetcher::PriceSource;
use crate::provider::retry::RetryPolicy;

pub const DEFAULT_PRICE_API_BASE_URL: &str = "https://min-api.cryptocompare.com";
const PRICE_PATH: &str = "/data/price?fsym=BTC&tsyms=USD";

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(rename = "USD")]
    usd: Decimal,
}

pub struct CoinDeskSource {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
    clock: Clock,
}

impl CoinDeskSource {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            retry: RetryPolicy::default(),
            clock: Arc::new(Utc::now),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    fn price_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), PRICE_PATH)
    }

    async fn fetch_once(&self) -> Result<PriceReading, SourceError> {
        let mut request = self.client.get(self.price_url());
        if !self.token.is_empty() {
            request = request.header(AUTHORIZATION, format!("Apikey {}", self.token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let dto: PriceResponse = serde_json::from_slice(&body)?;
        if dto.usd <= Decimal::ZERO {
            return Err(SourceError::Unavailable(format!("non-positive price {}", dto.usd)));
        }

        Ok(PriceReading::new(dto.usd, (self.clock)()))
    }
}

#[async_trait]
impl PriceSource for CoinDeskSource {
    async fn fetch_price(&self) -> Result<PriceReading, SourceError> {
        self.retry
            .retry_if(|_| self.fetch_once(), SourceError::is_transient)
            .await
    }
}
