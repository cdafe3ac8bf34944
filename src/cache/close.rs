use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use parking_lot::RwLock;

use crate::error::Result;
use crate::market::{
    crypto_close_window, stock_close_window, AssetClass, CloseWindow, MarketCalendar,
    SnapshotSources, SymbolRegistry,
};

struct CloseState {
    stock: Vec<Option<f64>>,
    crypto: Vec<Option<f64>>,
    merged: Vec<Option<f64>>,
    ready: bool,
}

// Each class keeps its last result; the merged array is swapped whole
pub struct ClosePriceCache {
    registry: Arc<SymbolRegistry>,
    sources: SnapshotSources,
    calendar: MarketCalendar,
    state: RwLock<CloseState>,
}

impl ClosePriceCache {
    pub fn new(registry: Arc<SymbolRegistry>, sources: SnapshotSources, calendar: MarketCalendar) -> Self {
        let (stocks, crypto) = registry.partition();
        let state = CloseState {
            stock: vec![None; stocks.len()],
            crypto: vec![None; crypto.len()],
            merged: vec![None; registry.len()],
            ready: false,
        };
        Self {
            registry,
            sources,
            calendar,
            state: RwLock::new(state),
        }
    }

    pub async fn initialize(&self, now: DateTime<Utc>) -> Result<()> {
        tokio::try_join!(self.rebuild_stock_closes(now), self.rebuild_crypto_closes(now))?;
        self.state.write().ready = true;
        Ok(())
    }

    pub async fn rebuild_stock_closes(&self, now: DateTime<Utc>) -> Result<()> {
        self.rebuild(AssetClass::Stock, now).await
    }

    pub async fn rebuild_crypto_closes(&self, now: DateTime<Utc>) -> Result<()> {
        self.rebuild(AssetClass::Crypto, now).await
    }

    pub fn window_for(&self, class: AssetClass, now: DateTime<Utc>) -> Result<CloseWindow> {
        match class {
            AssetClass::Stock => stock_close_window(now, &self.calendar),
            AssetClass::Crypto => Ok(crypto_close_window(now)),
        }
    }

    pub async fn rebuild(&self, class: AssetClass, now: DateTime<Utc>) -> Result<()> {
        let window = self.window_for(class, now)?;
        let symbols = self.registry.symbols_for(class);

        // Fetch without holding the lock
        let closes = self.sources.for_class(class).closes_at(symbols, window).await?;
        let found = closes.iter().filter(|c| c.is_some()).count();

        {
            let mut state = self.state.write();
            let merged = match class {
                AssetClass::Stock => self.registry.interleave(&closes, &state.crypto)?,
                AssetClass::Crypto => self.registry.interleave(&state.stock, &closes)?,
            };
            match class {
                AssetClass::Stock => state.stock = closes,
                AssetClass::Crypto => state.crypto = closes,
            }
            state.merged = merged;
        }

        info!(
            "Rebuilt {} closes for window {} .. {}: {}/{} found",
            class,
            window.start.to_rfc3339(),
            window.end.to_rfc3339(),
            found,
            symbols.len()
        );
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<Option<f64>> {
        self.state.read().merged.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().ready
    }
}
