mod api;
mod auth;
mod cache;
mod config;
mod error;
mod market;
mod news;
mod scheduler;
mod stream;
mod websocket;

use std::sync::Arc;

use axum::http::HeaderValue;
use chrono::Utc;
use log::{error, info, warn};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api::{create_api_router, ApiState};
use crate::auth::AccessPolicy;
use crate::cache::{ClosePriceCache, LivePriceCache};
use crate::config::{Config, BROADCAST_CHANNEL_SIZE};
use crate::error::Error;
use crate::market::{AlpacaFetcher, AssetClass, SnapshotSources};
use crate::news::{NewsCache, NewsDataClient, NewsSource};
use crate::scheduler::Scheduler;
use crate::stream::{ReconnectPolicy, TradeStream, CRYPTO_STREAM_URL};
use crate::websocket::{Broadcaster, SubscriberHandler, SubscriberRegistry};

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        warn!("No allowed origins configured, CORS is permissive");
        return CorsLayer::permissive();
    }

    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid origin '{}'", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(values))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Load configuration
    let config = Config::from_env();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    config.log_config();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    let registry = Arc::new(config.registry()?);
    let (stocks, crypto) = registry.partition();
    info!("Loaded {} symbols ({} stock, {} crypto)", registry.len(), stocks.len(), crypto.len());

    // Upstream clients
    let http = AlpacaFetcher::http_client(config.http_timeout())?;
    let sources = SnapshotSources::new(
        Arc::new(AlpacaFetcher::new(
            http.clone(),
            AssetClass::Stock,
            &config.data_url,
            &config.feed,
            config.credentials(),
        )),
        Arc::new(AlpacaFetcher::new(
            http.clone(),
            AssetClass::Crypto,
            &config.data_url,
            &config.feed,
            config.credentials(),
        )),
    );
    let news_source: Option<Arc<dyn NewsSource>> = config
        .news_api_key
        .as_deref()
        .map(|key| Arc::new(NewsDataClient::new(http.clone(), &config.news_url, key)) as Arc<dyn NewsSource>);

    // Caches must be filled before anything is served
    let live = Arc::new(LivePriceCache::new(registry.clone()));
    let closes = Arc::new(ClosePriceCache::new(registry.clone(), sources.clone(), config.calendar()));
    let news = Arc::new(NewsCache::new(news_source));

    let boot_timeout = config.boot_timeout();
    let boot = async {
        tokio::try_join!(live.initialize(&sources), closes.initialize(Utc::now()))?;
        Ok::<(), Error>(())
    };
    match tokio::time::timeout(boot_timeout, boot).await {
        Ok(Ok(())) => info!("Price caches initialized"),
        Ok(Err(e)) => {
            error!("Cache initialization failed: {}", e);
            return Err(e.into());
        }
        Err(_) => {
            error!("Cache initialization exceeded {:?}", boot_timeout);
            return Err(Error::Timeout(boot_timeout).into());
        }
    }
    let article_count = news.refresh().await;
    info!("News cache holds {} articles", article_count);

    // Trade streams
    let reconnect = ReconnectPolicy::default();
    let stock_stream = TradeStream::new(
        AssetClass::Stock,
        &TradeStream::stock_url(&config.feed),
        config.credentials(),
        registry.clone(),
        live.clone(),
        reconnect.clone(),
    );
    let crypto_stream = TradeStream::new(
        AssetClass::Crypto,
        CRYPTO_STREAM_URL,
        config.credentials(),
        registry.clone(),
        live.clone(),
        reconnect,
    );
    let stream_states = vec![
        (AssetClass::Stock, stock_stream.state()),
        (AssetClass::Crypto, crypto_stream.state()),
    ];
    tokio::spawn(stock_stream.run());
    tokio::spawn(crypto_stream.run());

    // Fan-out and timers
    let policy = Arc::new(AccessPolicy::new(&config.token, config.allowed_origins.clone()));
    let subscribers = SubscriberRegistry::new(config.max_subscribers);
    let broadcaster = Broadcaster::new(BROADCAST_CHANNEL_SIZE, live.clone(), closes.clone(), news.clone());

    Scheduler::new(
        config.scheduler(),
        closes.clone(),
        broadcaster.clone(),
        subscribers.clone(),
        stream_states,
    )
    .start();

    // Start API server
    let api_state = ApiState {
        policy: policy.clone(),
        live,
        closes,
        news,
    };
    let api_router = create_api_router(api_state).layer(cors_layer(policy.allowed_origins()));

    let api_listener = TcpListener::bind(&config.api_bind_address).await?;
    info!("HTTP API server running at http://{}", config.api_bind_address);
    let api_server = axum::serve(api_listener, api_router);

    // Start WebSocket server
    let ws_listener = TcpListener::bind(&config.bind_address).await?;
    info!("WebSocket server running at ws://{}", config.bind_address);

    let websocket_server = async move {
        loop {
            match ws_listener.accept().await {
                Ok((stream, addr)) => {
                    let handler = SubscriberHandler::new(policy.clone(), subscribers.clone(), addr.to_string());
                    let rx = broadcaster.subscribe();
                    tokio::spawn(handler.handle_connection(stream, rx));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        result = api_server => {
            error!("API server stopped: {:?}", result);
        }
        _ = websocket_server => {
            error!("WebSocket server stopped");
        }
    }

    Ok(())
}
