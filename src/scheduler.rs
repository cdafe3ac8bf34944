use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use log::{error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::cache::ClosePriceCache;
use crate::market::{next_fire, AssetClass, EXCHANGE_TZ};
use crate::stream::StreamState;
use crate::websocket::{Broadcaster, SubscriberRegistry};

#[derive(Debug, Clone)]
pub struct DailyTrigger {
    pub tz: Tz,
    pub at: NaiveTime,
    pub delay: Duration,
}

impl DailyTrigger {
    pub fn stock() -> Self {
        Self {
            tz: EXCHANGE_TZ,
            at: NaiveTime::from_hms_opt(16, 15, 0).unwrap_or(NaiveTime::MIN),
            delay: Duration::ZERO,
        }
    }

    pub fn crypto(settle_delay: Duration) -> Self {
        Self {
            tz: chrono_tz::UTC,
            at: NaiveTime::MIN,
            delay: settle_delay,
        }
    }

    pub fn wait_from(&self, now: DateTime<Utc>) -> Duration {
        let fire = next_fire(now, &self.tz, self.at);
        (fire - now).to_std().unwrap_or(Duration::ZERO) + self.delay
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub crypto_close_delay: Duration,
    pub price_interval: Duration,
    pub news_interval: Duration,
    pub stats_interval: Duration,
}

pub struct Scheduler {
    config: SchedulerConfig,
    closes: Arc<ClosePriceCache>,
    broadcaster: Broadcaster,
    subscribers: SubscriberRegistry,
    stream_states: Vec<(AssetClass, watch::Receiver<StreamState>)>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        closes: Arc<ClosePriceCache>,
        broadcaster: Broadcaster,
        subscribers: SubscriberRegistry,
        stream_states: Vec<(AssetClass, watch::Receiver<StreamState>)>,
    ) -> Self {
        Self {
            config,
            closes,
            broadcaster,
            subscribers,
            stream_states,
        }
    }

    pub fn start(self) -> Vec<JoinHandle<()>> {
        let handles = vec![
            self.spawn_close_rebuild(AssetClass::Stock, DailyTrigger::stock()),
            self.spawn_close_rebuild(AssetClass::Crypto, DailyTrigger::crypto(self.config.crypto_close_delay)),
            self.spawn_price_broadcast(),
            self.spawn_news_broadcast(),
            self.spawn_stats(),
        ];

        info!(
            "Started scheduler: prices every {:?}, news every {:?}, stats every {:?}",
            self.config.price_interval, self.config.news_interval, self.config.stats_interval
        );
        handles
    }

    fn spawn_close_rebuild(&self, class: AssetClass, trigger: DailyTrigger) -> JoinHandle<()> {
        let closes = self.closes.clone();
        tokio::spawn(async move {
            loop {
                let wait = trigger.wait_from(Utc::now());
                info!("Next {} close rebuild in {:?}", class, wait);
                sleep(wait).await;

                // Previous closes stay in place when a rebuild fails
                match closes.rebuild(class, Utc::now()).await {
                    Ok(()) => info!("{} closes rebuilt", class),
                    Err(e) => error!("Failed to rebuild {} closes: {}", class, e),
                }
            }
        })
    }

    fn spawn_price_broadcast(&self) -> JoinHandle<()> {
        let broadcaster = self.broadcaster.clone();
        let mut timer = ticker(self.config.price_interval);
        tokio::spawn(async move {
            timer.tick().await;
            loop {
                timer.tick().await;
                broadcaster.publish_prices();
            }
        })
    }

    fn spawn_news_broadcast(&self) -> JoinHandle<()> {
        let broadcaster = self.broadcaster.clone();
        let mut timer = ticker(self.config.news_interval);
        tokio::spawn(async move {
            timer.tick().await;
            loop {
                timer.tick().await;
                broadcaster.publish_news().await;
            }
        })
    }

    fn spawn_stats(&self) -> JoinHandle<()> {
        let subscribers = self.subscribers.clone();
        let states = self.stream_states.clone();
        let mut timer = ticker(self.config.stats_interval);
        tokio::spawn(async move {
            timer.tick().await;
            loop {
                timer.tick().await;
                info!("{}", stats_line(&subscribers, &states));
            }
        })
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

fn stats_line(subscribers: &SubscriberRegistry, states: &[(AssetClass, watch::Receiver<StreamState>)]) -> String {
    let streams: Vec<String> = states
        .iter()
        .map(|(class, rx)| format!("{}={}", class, *rx.borrow()))
        .collect();
    format!(
        "Stats - Subscribers: {}/{}, Streams: [{}]",
        subscribers.count(),
        subscribers.max_subscribers(),
        streams.join(", ")
    )
}
