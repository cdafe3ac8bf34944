pub mod fetcher;
pub mod registry;
pub mod session;

use std::sync::Arc;

pub use fetcher::{AlpacaCredentials, AlpacaFetcher, SnapshotSource, DEFAULT_DATA_URL};
pub use registry::{AssetClass, SymbolRegistry};
pub use session::{
    crypto_close_window, next_fire, stock_close_window, CloseWindow, MarketCalendar, EXCHANGE_TZ,
};

#[derive(Clone)]
pub struct SnapshotSources {
    pub stock: Arc<dyn SnapshotSource>,
    pub crypto: Arc<dyn SnapshotSource>,
}

impl SnapshotSources {
    pub fn new(stock: Arc<dyn SnapshotSource>, crypto: Arc<dyn SnapshotSource>) -> Self {
        debug_assert_eq!(stock.asset_class(), AssetClass::Stock);
        debug_assert_eq!(crypto.asset_class(), AssetClass::Crypto);
        Self { stock, crypto }
    }

    pub fn for_class(&self, class: AssetClass) -> &Arc<dyn SnapshotSource> {
        match class {
            AssetClass::Stock => &self.stock,
            AssetClass::Crypto => &self.crypto,
        }
    }
}
