use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("couldn't determine btc price: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status code: {0}")]
    Status(u16),

    #[error("failed to unmarshal response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("price source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Request(_) | SourceError::Unavailable(_) => true,
            SourceError::Status(code) => *code >= 500,
            SourceError::Decode(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("delivery timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("subscriber closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set when PRICE_SOURCE=coindesk")]
    MissingToken(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("unknown price source: {0}")]
    UnknownSource(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct InvalidParamError {
    pub message: String,
    pub details: HashMap<String, String>,
}

impl InvalidParamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, field: impl Into<String>, reason: impl Into<String>) -> Self {
        self.details.insert(field.into(), reason.into());
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, String>>,
}

impl From<&InvalidParamError> for ErrorPayload {
    fn from(err: &InvalidParamError) -> Self {
        Self {
            error: true,
            message: err.message.clone(),
            details: Some(err.details.clone()),
        }
    }
}

impl ErrorPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
