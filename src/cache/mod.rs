pub mod close;
pub mod live;

pub use close::ClosePriceCache;
pub use live::LivePriceCache;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::{Error, Result};
    use crate::market::{AssetClass, CloseWindow, SnapshotSource, SnapshotSources};

    pub struct FakeSource {
        class: AssetClass,
        trades: Vec<Option<f64>>,
        closes: Mutex<Vec<Option<f64>>>,
        failing: Mutex<bool>,
        close_calls: AtomicUsize,
        last_window: Mutex<Option<CloseWindow>>,
    }

    impl FakeSource {
        pub fn new(class: AssetClass, values: Vec<Option<f64>>) -> Self {
            Self {
                class,
                trades: values.clone(),
                closes: Mutex::new(values),
                failing: Mutex::new(false),
                close_calls: AtomicUsize::new(0),
                last_window: Mutex::new(None),
            }
        }

        pub fn failing(class: AssetClass) -> Self {
            let source = Self::new(class, Vec::new());
            source.set_failing(true);
            source
        }

        pub fn set_closes(&self, closes: Vec<Option<f64>>) {
            *self.closes.lock() = closes;
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock() = failing;
        }

        pub fn close_calls(&self) -> usize {
            self.close_calls.load(Ordering::SeqCst)
        }

        pub fn last_window(&self) -> Option<CloseWindow> {
            *self.last_window.lock()
        }

        fn check(&self) -> Result<()> {
            if *self.failing.lock() {
                return Err(Error::UpstreamStatus {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SnapshotSource for FakeSource {
        fn asset_class(&self) -> AssetClass {
            self.class
        }

        async fn latest_trades(&self, _symbols: &[String]) -> Result<Vec<Option<f64>>> {
            self.check()?;
            Ok(self.trades.clone())
        }

        async fn closes_at(&self, _symbols: &[String], window: CloseWindow) -> Result<Vec<Option<f64>>> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_window.lock() = Some(window);
            self.check()?;
            Ok(self.closes.lock().clone())
        }
    }

    pub fn sample_sources() -> SnapshotSources {
        SnapshotSources::new(
            Arc::new(FakeSource::new(AssetClass::Stock, vec![Some(100.0), Some(200.0)])),
            Arc::new(FakeSource::new(AssetClass::Crypto, vec![Some(50000.0)])),
        )
    }
}
