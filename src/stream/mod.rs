pub mod client;
pub mod protocol;

pub use client::{ReconnectPolicy, TradeStream, CRYPTO_STREAM_URL};
pub use protocol::StreamState;
