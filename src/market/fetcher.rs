use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::market::{AssetClass, CloseWindow};

pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";

// Upper bound Alpaca accepts for `limit` on bar queries
const BARS_PAGE_LIMIT: usize = 10_000;
const MAX_BAR_PAGES: usize = 10;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    fn asset_class(&self) -> AssetClass;

    async fn latest_trades(&self, symbols: &[String]) -> Result<Vec<Option<f64>>>;

    async fn closes_at(&self, symbols: &[String], window: CloseWindow) -> Result<Vec<Option<f64>>>;
}

#[derive(Debug, Clone)]
pub struct AlpacaCredentials {
    pub key_id: String,
    pub secret_key: String,
}

#[derive(Debug, Deserialize)]
struct LatestTradesResponse {
    #[serde(default)]
    trades: HashMap<String, TradeRecord>,
}

#[derive(Debug, Deserialize)]
struct TradeRecord {
    #[serde(rename = "p")]
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<HashMap<String, Vec<BarRecord>>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BarRecord {
    #[serde(rename = "c")]
    close: Option<f64>,
}

pub struct AlpacaFetcher {
    client: Client,
    class: AssetClass,
    base_url: String,
    feed: String,
    credentials: AlpacaCredentials,
}

impl AlpacaFetcher {
    pub fn new(
        client: Client,
        class: AssetClass,
        base_url: &str,
        feed: &str,
        credentials: AlpacaCredentials,
    ) -> Self {
        Self {
            client,
            class,
            base_url: base_url.trim_end_matches('/').to_string(),
            feed: feed.to_string(),
            credentials,
        }
    }

    pub fn http_client(timeout: Duration) -> Result<Client> {
        Ok(Client::builder()
            .timeout(timeout)
            .user_agent(concat!("market_relay/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }

    fn latest_trades_url(&self) -> String {
        match self.class {
            AssetClass::Stock => format!("{}/v2/stocks/trades/latest", self.base_url),
            AssetClass::Crypto => format!("{}/v1beta3/crypto/us/latest/trades", self.base_url),
        }
    }

    fn bars_url(&self) -> String {
        match self.class {
            AssetClass::Stock => format!("{}/v2/stocks/bars", self.base_url),
            AssetClass::Crypto => format!("{}/v1beta3/crypto/us/bars", self.base_url),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!("GET {} ({} query params) for {}", url, query.len(), self.class);

        let response = self
            .client
            .get(url)
            .query(query)
            .header("accept", "application/json")
            .header("APCA-API-KEY-ID", &self.credentials.key_id)
            .header("APCA-API-SECRET-KEY", &self.credentials.secret_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SnapshotSource for AlpacaFetcher {
    fn asset_class(&self) -> AssetClass {
        self.class
    }

    async fn latest_trades(&self, symbols: &[String]) -> Result<Vec<Option<f64>>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = vec![("symbols", symbols.join(","))];
        if self.class == AssetClass::Stock {
            query.push(("feed", self.feed.clone()));
        }

        let response: LatestTradesResponse = self.get_json(&self.latest_trades_url(), &query).await?;
        Ok(prices_in_order(symbols, &response.trades))
    }

    async fn closes_at(&self, symbols: &[String], window: CloseWindow) -> Result<Vec<Option<f64>>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let mut first_bars: HashMap<String, f64> = HashMap::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_BAR_PAGES {
            let mut query = vec![
                ("symbols", symbols.join(",")),
                ("timeframe", "1T".to_string()),
                ("start", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("limit", BARS_PAGE_LIMIT.to_string()),
                ("sort", "asc".to_string()),
            ];
            if self.class == AssetClass::Stock {
                query.push(("adjustment", "raw".to_string()));
                query.push(("feed", self.feed.clone()));
            }
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: BarsResponse = self.get_json(&self.bars_url(), &query).await?;
            collect_first_bars(&mut first_bars, page.bars.unwrap_or_default());

            page_token = page.next_page_token.filter(|t| !t.is_empty());
            if page_token.is_none() || first_bars.len() == symbols.len() {
                break;
            }
        }

        if page_token.is_some() && first_bars.len() < symbols.len() {
            warn!(
                "Stopped paging {} bars after {} pages with {}/{} symbols resolved",
                self.class,
                MAX_BAR_PAGES,
                first_bars.len(),
                symbols.len()
            );
        }

        Ok(symbols.iter().map(|s| first_bars.get(s).copied()).collect())
    }
}

fn prices_in_order(symbols: &[String], trades: &HashMap<String, TradeRecord>) -> Vec<Option<f64>> {
    symbols
        .iter()
        .map(|symbol| trades.get(symbol).and_then(|t| t.price))
        .collect()
}

// Pages are sorted ascending, so the first bar seen for a symbol wins.
fn collect_first_bars(first_bars: &mut HashMap<String, f64>, page: HashMap<String, Vec<BarRecord>>) {
    for (symbol, bars) in page {
        if first_bars.contains_key(&symbol) {
            continue;
        }
        if let Some(close) = bars.iter().find_map(|bar| bar.close) {
            first_bars.insert(symbol, close);
        }
    }
}
