use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::market::AssetClass;

#[derive(Error, Debug)]
pub enum Error {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("{class} result has {actual} values, registry expects {expected}")]
    LengthMismatch {
        class: AssetClass,
        expected: usize,
        actual: usize,
    },

    #[error("stream authentication rejected: {0}")]
    StreamAuth(String),

    #[error("stream disconnected: {0}")]
    StreamDisconnect(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no trading session found on or before {0}")]
    NoSession(NaiveDate),
}

pub type Result<T> = std::result::Result<T, Error>;
