use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    #[serde(rename = "stock")]
    Stock,
    #[serde(rename = "crypto")]
    Crypto,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Crypto => "crypto",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub symbol: String,
    #[serde(rename = "type")]
    pub asset_class: AssetClass,
}

impl RegistryEntry {
    pub fn new(symbol: &str, asset_class: AssetClass) -> Self {
        Self {
            symbol: symbol.to_string(),
            asset_class,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    entries: Vec<RegistryEntry>,
    index: HashMap<String, usize>,
    stock_symbols: Vec<String>,
    crypto_symbols: Vec<String>,
}

impl SymbolRegistry {
    pub fn new(entries: Vec<RegistryEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Config("symbol registry is empty".to_string()));
        }

        let mut index = HashMap::with_capacity(entries.len());
        let mut stock_symbols = Vec::new();
        let mut crypto_symbols = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            if entry.symbol.trim().is_empty() {
                return Err(Error::Config(format!("empty symbol at position {}", i)));
            }
            if index.insert(entry.symbol.clone(), i).is_some() {
                return Err(Error::Config(format!("duplicate symbol: {}", entry.symbol)));
            }
            match entry.asset_class {
                AssetClass::Stock => stock_symbols.push(entry.symbol.clone()),
                AssetClass::Crypto => crypto_symbols.push(entry.symbol.clone()),
            }
        }

        Ok(Self {
            entries,
            index,
            stock_symbols,
            crypto_symbols,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<RegistryEntry> = serde_json::from_str(json)?;
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    pub fn partition(&self) -> (&[String], &[String]) {
        (&self.stock_symbols, &self.crypto_symbols)
    }

    pub fn symbols_for(&self, class: AssetClass) -> &[String] {
        match class {
            AssetClass::Stock => &self.stock_symbols,
            AssetClass::Crypto => &self.crypto_symbols,
        }
    }

    // Each class has its own cursor, advanced only on entries of that class
    pub fn interleave<T: Clone>(&self, stock: &[T], crypto: &[T]) -> Result<Vec<T>> {
        self.check_len(AssetClass::Stock, stock.len())?;
        self.check_len(AssetClass::Crypto, crypto.len())?;

        let mut stock_iter = stock.iter();
        let mut crypto_iter = crypto.iter();
        let merged = self
            .entries
            .iter()
            .filter_map(|entry| match entry.asset_class {
                AssetClass::Stock => stock_iter.next().cloned(),
                AssetClass::Crypto => crypto_iter.next().cloned(),
            })
            .collect();

        Ok(merged)
    }

    fn check_len(&self, class: AssetClass, actual: usize) -> Result<()> {
        let expected = self.symbols_for(class).len();
        if expected != actual {
            return Err(Error::LengthMismatch {
                class,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

pub fn default_entries() -> Vec<RegistryEntry> {
    use AssetClass::{Crypto, Stock};

    [
        ("SPY", Stock),
        ("QQQ", Stock),
        ("IWM", Stock),
        ("AAPL", Stock),
        ("MSFT", Stock),
        ("BTC/USD", Crypto),
        ("ETH/USD", Crypto),
        ("NVDA", Stock),
        ("META", Stock),
        ("AMZN", Stock),
        ("TSLA", Stock),
        ("GOOGL", Stock),
        ("DIA", Stock),
        ("VTI", Stock),
        ("GLD", Stock),
        ("SOL/USD", Crypto),
        ("DOGE/USD", Crypto),
    ]
    .iter()
    .map(|(symbol, class)| RegistryEntry::new(symbol, *class))
    .collect()
}

#[cfg(test)]
pub(crate) fn sample_registry() -> SymbolRegistry {
    SymbolRegistry::new(vec![
        RegistryEntry::new("SPY", AssetClass::Stock),
        RegistryEntry::new("BTC/USD", AssetClass::Crypto),
        RegistryEntry::new("AAPL", AssetClass::Stock),
    ])
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_preserves_relative_order() {
        let registry = SymbolRegistry::new(default_entries()).unwrap();
        let (stocks, crypto) = registry.partition();

        assert_eq!(stocks.len(), 13);
        assert_eq!(&stocks[..3], &["SPY", "QQQ", "IWM"]);
        assert_eq!(stocks.last().unwrap(), "GLD");
        assert_eq!(crypto, &["BTC/USD", "ETH/USD", "SOL/USD", "DOGE/USD"]);
    }

    #[test]
    fn test_index_of() {
        let registry = sample_registry();
        assert_eq!(registry.index_of("SPY"), Some(0));
        assert_eq!(registry.index_of("BTC/USD"), Some(1));
        assert_eq!(registry.index_of("AAPL"), Some(2));
        assert_eq!(registry.index_of("DOGE/USD"), None);
    }

    #[test]
    fn test_interleave_restores_registry_order() {
        let registry = sample_registry();
        let merged = registry
            .interleave(&[Some(100.0), Some(200.0)], &[Some(50000.0)])
            .unwrap();
        assert_eq!(merged, vec![Some(100.0), Some(50000.0), Some(200.0)]);
    }

    #[test]
    fn test_interleave_rejects_wrong_length() {
        let registry = sample_registry();
        let err = registry
            .interleave(&[Some(1.0)], &[Some(2.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch { class: AssetClass::Stock, expected: 2, actual: 1 }
        ));
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        let dup = vec![
            RegistryEntry::new("SPY", AssetClass::Stock),
            RegistryEntry::new("SPY", AssetClass::Stock),
        ];
        assert!(SymbolRegistry::new(dup).is_err());
        assert!(SymbolRegistry::new(vec![]).is_err());
    }

    #[test]
    fn test_from_json() {
        let registry = SymbolRegistry::from_json(
            r#"[{"symbol":"SPY","type":"stock"},{"symbol":"ETH/USD","type":"crypto"}]"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.symbols_for(AssetClass::Crypto), &["ETH/USD"]);
        assert!(SymbolRegistry::from_json(r#"[{"symbol":"X","type":"bond"}]"#).is_err());
    }
}
