use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use rand::Rng;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::cache::LivePriceCache;
use crate::error::{Error, Result};
use crate::market::{AlpacaCredentials, AssetClass, SymbolRegistry};
use crate::stream::protocol::{decode_frame, ClientMessage, SessionAction, StreamSession, StreamState};

pub const STOCK_STREAM_BASE: &str = "wss://stream.data.alpaca.markets/v2";
pub const CRYPTO_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v1beta3/crypto/us";

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    // Doubles per attempt up to `max_delay`, plus up to 25% jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self
            .initial_delay
            .saturating_mul(1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX))
            .min(self.max_delay);
        let jitter_ms = (base.as_millis() as u64) / 4;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        base + Duration::from_millis(jitter)
    }
}

pub struct TradeStream {
    class: AssetClass,
    url: String,
    credentials: AlpacaCredentials,
    registry: Arc<SymbolRegistry>,
    live: Arc<LivePriceCache>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<StreamState>,
}

impl TradeStream {
    pub fn new(
        class: AssetClass,
        url: &str,
        credentials: AlpacaCredentials,
        registry: Arc<SymbolRegistry>,
        live: Arc<LivePriceCache>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(StreamState::Disconnected);
        Self {
            class,
            url: url.to_string(),
            credentials,
            registry,
            live,
            policy,
            state_tx,
        }
    }

    pub fn stock_url(feed: &str) -> String {
        format!("{}/{}", STOCK_STREAM_BASE, feed)
    }

    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: StreamState) {
        self.state_tx.send_replace(state);
    }

    pub async fn run(self) {
        let symbols = self.registry.symbols_for(self.class).to_vec();
        if symbols.is_empty() {
            info!("[{}] No symbols configured, stream not started", self.class);
            return;
        }

        let mut attempt: u32 = 0;
        loop {
            match self.connect_and_stream(&symbols).await {
                Ok(()) => warn!("[{}] Stream closed by upstream", self.class),
                Err(Error::StreamAuth(reason)) => {
                    error!("[{}] Stream authentication failed: {}", self.class, reason)
                }
                Err(e) => error!("[{}] Stream error: {}", self.class, e),
            }

            // A session that got as far as subscribing resets the backoff
            if *self.state_tx.borrow() == StreamState::Subscribed {
                attempt = 0;
            }
            self.set_state(StreamState::Disconnected);

            let delay = self.policy.delay_for(attempt);
            attempt = attempt.saturating_add(1);
            info!("[{}] Reconnecting in {:?} (attempt {})", self.class, delay, attempt);
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_stream(&self, symbols: &[String]) -> Result<()> {
        self.set_state(StreamState::Connecting);
        info!("[{}] Connecting to {}", self.class, self.url);

        let (ws_stream, _) = tokio::time::timeout(self.policy.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| Error::Timeout(self.policy.connect_timeout))??;
        let (mut write, mut read) = ws_stream.split();

        let label = self.class.to_string();
        let mut session = StreamSession::opened(&label);
        self.set_state(session.state());

        let auth = ClientMessage::Auth {
            key: &self.credentials.key_id,
            secret: &self.credentials.secret_key,
        };
        write.send(Message::Text(serde_json::to_string(&auth)?)).await?;

        while let Some(msg_result) = read.next().await {
            let text = match msg_result? {
                Message::Text(text) => text,
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("[{}] Dropping non UTF-8 binary frame", self.class);
                        continue;
                    }
                },
                Message::Close(frame) => {
                    info!("[{}] Received close frame: {:?}", self.class, frame);
                    break;
                }
                _ => continue,
            };

            let messages = match decode_frame(&text) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("[{}] Dropping malformed frame: {}", self.class, e);
                    continue;
                }
            };

            for message in messages {
                match session.on_message(message) {
                    Some(SessionAction::SendSubscribe) => {
                        self.set_state(StreamState::Subscribed);
                        let sub = ClientMessage::Subscribe { trades: symbols };
                        write.send(Message::Text(serde_json::to_string(&sub)?)).await?;
                        info!("[{}] Subscription request sent for {} symbols", self.class, symbols.len());
                    }
                    Some(SessionAction::ApplyTrade { symbol, price }) => {
                        self.live.apply_trade(&symbol, price);
                    }
                    Some(SessionAction::Fail(reason)) => return Err(Error::StreamAuth(reason)),
                    None => {}
                }
            }
        }

        if session.state() == StreamState::Subscribed {
            Ok(())
        } else {
            Err(Error::StreamDisconnect("closed before subscription".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, WebSocketStream};

    use crate::cache::testing::sample_sources;
    use crate::market::registry::{sample_registry, RegistryEntry};

    fn credentials() -> AlpacaCredentials {
        AlpacaCredentials {
            key_id: "k".to_string(),
            secret_key: "s".to_string(),
        }
    }

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(1),
        }
    }

    async fn upstream() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (tcp, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        accept_async(tcp).await.unwrap()
    }

    async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    async fn send(ws: &mut WebSocketStream<TcpStream>, frame: &str) {
        ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            connect_timeout: Duration::from_secs(1),
        };

        for (attempt, base) in [(0, 1), (1, 2), (2, 4), (3, 8), (4, 8), (40, 8)] {
            let delay = policy.delay_for(attempt);
            let base = Duration::from_secs(base);
            assert!(delay >= base, "attempt {}: {:?} < {:?}", attempt, delay, base);
            assert!(delay <= base + base / 4, "attempt {}: {:?} too long", attempt, delay);
        }
    }

    #[test]
    fn test_stream_urls() {
        assert_eq!(TradeStream::stock_url("iex"), "wss://stream.data.alpaca.markets/v2/iex");
    }

    #[tokio::test]
    async fn test_state_starts_disconnected() {
        let registry = Arc::new(crate::market::registry::sample_registry());
        let live = Arc::new(LivePriceCache::new(registry.clone()));
        let stream = TradeStream::new(
            AssetClass::Crypto,
            CRYPTO_STREAM_URL,
            AlpacaCredentials {
                key_id: "k".to_string(),
                secret_key: "s".to_string(),
            },
            registry,
            live,
            ReconnectPolicy::default(),
        );
        assert_eq!(*stream.state().borrow(), StreamState::Disconnected);
    }

    #[tokio::test]
    async fn test_session_authenticates_subscribes_and_applies_trades() {
        let (listener, url) = upstream().await;
        let registry = Arc::new(sample_registry());
        let live = Arc::new(LivePriceCache::new(registry.clone()));
        live.initialize(&sample_sources()).await.unwrap();

        let stream = TradeStream::new(
            AssetClass::Crypto,
            &url,
            credentials(),
            registry,
            live.clone(),
            fast_policy(),
        );
        let mut state = stream.state();
        let handle = tokio::spawn(stream.run());

        let mut ws = accept(&listener).await;
        assert_eq!(next_json(&mut ws).await, json!({"action": "auth", "key": "k", "secret": "s"}));

        // Trades before authentication are not applied
        send(&mut ws, r#"[{"T":"t","S":"BTC/USD","p":1.0}]"#).await;
        send(&mut ws, r#"[{"T":"success","msg":"authenticated"}]"#).await;

        assert_eq!(next_json(&mut ws).await, json!({"action": "subscribe", "trades": ["BTC/USD"]}));
        send(
            &mut ws,
            r#"[{"T":"subscription","trades":["BTC/USD"]},{"T":"t","S":"BTC/USD","p":51000.0},{"T":"t","S":"XRP/USD","p":0.5}]"#,
        )
        .await;

        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == StreamState::Subscribed))
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while live.snapshot()[1] != Some(51000.0) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(live.snapshot(), vec![Some(100.0), Some(51000.0), Some(200.0)]);
        handle.abort();
    }

    #[tokio::test]
    async fn test_class_without_symbols_never_connects() {
        let registry = Arc::new(SymbolRegistry::new(vec![RegistryEntry::new("SPY", AssetClass::Stock)]).unwrap());
        let live = Arc::new(LivePriceCache::new(registry.clone()));
        let stream = TradeStream::new(
            AssetClass::Crypto,
            "ws://127.0.0.1:9",
            credentials(),
            registry,
            live,
            fast_policy(),
        );
        let state = stream.state();

        tokio::time::timeout(Duration::from_secs(1), stream.run()).await.unwrap();
        assert_eq!(*state.borrow(), StreamState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnects_after_upstream_close() {
        let (listener, url) = upstream().await;
        let registry = Arc::new(sample_registry());
        let live = Arc::new(LivePriceCache::new(registry.clone()));
        let stream = TradeStream::new(AssetClass::Stock, &url, credentials(), registry, live, fast_policy());
        let handle = tokio::spawn(stream.run());

        let mut first = accept(&listener).await;
        assert_eq!(next_json(&mut first).await["action"], "auth");
        first.close(None).await.unwrap();

        let mut second = accept(&listener).await;
        assert_eq!(next_json(&mut second).await["action"], "auth");
        send(&mut second, r#"[{"T":"success","msg":"authenticated"}]"#).await;
        assert_eq!(
            next_json(&mut second).await,
            json!({"action": "subscribe", "trades": ["SPY", "AAPL"]})
        );
        handle.abort();
    }
}
