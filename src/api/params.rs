use crate::data::{PriceReading, TtlStore};
use crate::errors::InvalidParamError;

pub const INVALID_PARAMS_MESSAGE: &str = "Invalid parameters provided";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayParams {
    pub since: Option<i64>,
}

impl ReplayParams {
    pub fn parse(raw_since: Option<&str>) -> Result<Self, InvalidParamError> {
        match raw_since.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(value) => value
                .parse::<i64>()
                .map(|since| Self { since: Some(since) })
                .map_err(|_| {
                    InvalidParamError::new(INVALID_PARAMS_MESSAGE)
                        .with_detail("query.since", "must be a valid integer")
                }),
        }
    }

    pub fn from_query(query: Option<&str>) -> Result<Self, InvalidParamError> {
        let mut since = None;

        if let Some(query) = query {
            for param in query.split('&') {
                let (key, value) = param.split_once('=').unwrap_or((param, ""));
                if key == "since" {
                    let decoded = urlencoding::decode(value).map_err(|_| {
                        InvalidParamError::new(INVALID_PARAMS_MESSAGE)
                            .with_detail("query.since", "must be valid UTF-8")
                    })?;
                    since = Some(decoded.into_owned());
                }
            }
        }

        Self::parse(since.as_deref())
    }

    pub fn replay_since(&self) -> Option<i64> {
        self.since.filter(|since| *since != 0)
    }
}

pub fn replay(store: &TtlStore<PriceReading>, since: Option<i64>) -> Vec<PriceReading> {
    match since {
        Some(since) => store.query(Some(&|reading: &PriceReading| reading.is_since(since))),
        None => store.query(None),
    }
}
