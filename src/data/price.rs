use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// timestamp is nanoseconds since the Unix epoch (UTC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    pub price_usd: Decimal,
    pub timestamp: i64,
}

impl PriceReading {
    pub fn new(price_usd: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            price_usd,
            timestamp: at.timestamp_nanos_opt().unwrap_or(i64::MAX),
        }
    }

    pub fn is_since(&self, since: i64) -> bool {
        self.timestamp >= since
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_reading_timestamp_is_nanoseconds() {
        let at = Utc.with_ymd_and_hms(2025, 6, 30, 10, 20, 0).unwrap();
        let reading = PriceReading::new(Decimal::from(1000), at);
        assert_eq!(reading.timestamp, at.timestamp() * 1_000_000_000);
    }

    #[test]
    fn test_wire_form_keeps_decimal_precision() {
        let reading = PriceReading {
            price_usd: Decimal::from_str("1000.15").unwrap(),
            timestamp: 12345,
        };
        let json = String::from_utf8(reading.to_json().unwrap()).unwrap();
        assert!(json.contains("\"price_usd\":\"1000.15\""));
        assert!(json.contains("\"timestamp\":12345"));

        let back: PriceReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn test_is_since_includes_boundary() {
        let reading = PriceReading { price_usd: Decimal::ONE, timestamp: 100 };
        assert!(reading.is_since(100));
        assert!(reading.is_since(0));
        assert!(!reading.is_since(101));
    }
}
