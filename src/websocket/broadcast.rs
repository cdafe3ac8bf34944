use std::sync::Arc;

use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::cache::{ClosePriceCache, LivePriceCache};
use crate::news::{NewsArticle, NewsCache};

#[derive(Debug, Serialize)]
pub struct PriceMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub prices: Vec<Option<f64>>,
    pub closes: Vec<Option<f64>>,
}

#[derive(Debug, Serialize)]
pub struct NewsMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub news: Vec<NewsArticle>,
}

// Lagging receivers skip the ticks they missed
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<String>,
    live: Arc<LivePriceCache>,
    closes: Arc<ClosePriceCache>,
    news: Arc<NewsCache>,
}

impl Broadcaster {
    pub fn new(
        capacity: usize,
        live: Arc<LivePriceCache>,
        closes: Arc<ClosePriceCache>,
        news: Arc<NewsCache>,
    ) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            live,
            closes,
            news,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn price_message(&self) -> PriceMessage {
        PriceMessage {
            kind: "p",
            prices: self.live.snapshot(),
            closes: self.closes.snapshot(),
        }
    }

    pub fn publish_prices(&self) -> usize {
        self.send("p", &self.price_message())
    }

    pub async fn publish_news(&self) -> usize {
        self.news.refresh().await;
        let message = NewsMessage {
            kind: "n",
            news: self.news.snapshot(),
        };
        self.send("n", &message)
    }

    fn send<T: Serialize>(&self, kind: &str, message: &T) -> usize {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize '{}' message: {}", kind, e);
                return 0;
            }
        };

        // Err only means nobody is connected
        match self.tx.send(json) {
            Ok(receivers) => {
                info!("Broadcasted '{}' message to {} subscribers", kind, receivers);
                receivers
            }
            Err(_) => {
                debug!("No subscribers for '{}' message", kind);
                0
            }
        }
    }
}
