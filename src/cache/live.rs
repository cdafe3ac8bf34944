use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;

use crate::error::Result;
use crate::market::{AssetClass, SnapshotSources, SymbolRegistry};

pub struct LivePriceCache {
    registry: Arc<SymbolRegistry>,
    prices: RwLock<Vec<Option<f64>>>,
    ready: RwLock<bool>,
}

impl LivePriceCache {
    pub fn new(registry: Arc<SymbolRegistry>) -> Self {
        let slots = vec![None; registry.len()];
        Self {
            registry,
            prices: RwLock::new(slots),
            ready: RwLock::new(false),
        }
    }

    pub async fn initialize(&self, sources: &SnapshotSources) -> Result<()> {
        let (stock_symbols, crypto_symbols) = self.registry.partition();

        let (stock_prices, crypto_prices) = tokio::try_join!(
            sources.for_class(AssetClass::Stock).latest_trades(stock_symbols),
            sources.for_class(AssetClass::Crypto).latest_trades(crypto_symbols),
        )?;

        let merged = self.registry.interleave(&stock_prices, &crypto_prices)?;
        let priced = merged.iter().filter(|p| p.is_some()).count();
        self.replace(merged);

        info!("Live prices initialized: {}/{} symbols priced", priced, self.registry.len());
        Ok(())
    }

    pub fn apply_trade(&self, symbol: &str, price: f64) -> bool {
        match self.registry.index_of(symbol) {
            Some(index) => {
                self.prices.write()[index] = Some(price);
                true
            }
            None => {
                warn!("Trade for unknown symbol \"{}\" dropped", symbol);
                false
            }
        }
    }

    pub fn snapshot(&self) -> Vec<Option<f64>> {
        self.prices.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.read()
    }

    fn replace(&self, prices: Vec<Option<f64>>) {
        *self.prices.write() = prices;
        *self.ready.write() = true;
    }
}
