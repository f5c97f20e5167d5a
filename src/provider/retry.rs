use std::future::Future;
use std::time::Duration;

use log::debug;
use rand::Rng;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration, jitter_pct: f64) -> Self {
        let base_delay = base_delay.max(Duration::from_millis(1));
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    pub fn none() -> Self {
        Self::new(1, Duration::from_millis(1), Duration::from_millis(1), 0.0)
    }

    fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u32.saturating_pow(attempt as u32);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        if self.jitter_pct == 0.0 {
            return delay;
        }

        let spread = delay.as_millis() as f64 * self.jitter_pct;
        let delta = rand::thread_rng().gen_range(-spread..=spread) as i64;
        let millis = (delay.as_millis() as i64).saturating_add(delta).max(0);
        Duration::from_millis(millis as u64)
    }

    // Returns the last error once should_retry rejects it or attempts run out
    pub async fn retry_if<F, Fut, T, E, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !should_retry(&err) {
                        return Err(err);
                    }
                    let delay = self.next_delay(attempt - 1);
                    debug!("attempt {} failed ({}), retrying in {:?}", attempt, err, delay);
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(10), 0.2)
    }
}
