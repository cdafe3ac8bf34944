use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Subscribed => "subscribed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "T")]
pub enum UpstreamMessage {
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: Option<i64>,
        #[serde(default)]
        msg: String,
    },
    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        trades: Vec<String>,
    },
    #[serde(rename = "t")]
    Trade {
        #[serde(rename = "S")]
        symbol: String,
        #[serde(rename = "p")]
        price: f64,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage<'a> {
    Auth { key: &'a str, secret: &'a str },
    Subscribe { trades: &'a [String] },
}

pub fn decode_frame(text: &str) -> Result<Vec<UpstreamMessage>, serde_json::Error> {
    let raw: Vec<Value> = match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items,
        single => vec![single],
    };

    Ok(raw
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<UpstreamMessage>(item.clone()) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!("Skipping undecodable stream message {}: {}", item, e);
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    SendSubscribe,
    ApplyTrade { symbol: String, price: f64 },
    Fail(String),
}

#[derive(Debug)]
pub struct StreamSession {
    label: String,
    state: StreamState,
}

impl StreamSession {
    pub fn opened(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: StreamState::Authenticating,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn on_message(&mut self, message: UpstreamMessage) -> Option<SessionAction> {
        match (self.state, message) {
            (StreamState::Authenticating, UpstreamMessage::Success { msg }) if msg == "authenticated" => {
                info!("[{}] Authenticated successfully", self.label);
                self.state = StreamState::Subscribed;
                Some(SessionAction::SendSubscribe)
            }
            (StreamState::Authenticating, UpstreamMessage::Error { code, msg }) => {
                Some(SessionAction::Fail(format!("code {:?}: {}", code, msg)))
            }
            (StreamState::Subscribed, UpstreamMessage::Trade { symbol, price }) => {
                Some(SessionAction::ApplyTrade { symbol, price })
            }
            (StreamState::Subscribed, UpstreamMessage::Subscription { trades }) => {
                info!("[{}] Subscribed to {} trade symbols", self.label, trades.len());
                None
            }
            (StreamState::Subscribed, UpstreamMessage::Error { code, msg }) => {
                warn!("[{}] Stream error code {:?}: {}", self.label, code, msg);
                None
            }
            (state, other) => {
                debug!("[{}] Ignoring message in state {}: {:?}", self.label, state, other);
                None
            }
        }
    }
}
