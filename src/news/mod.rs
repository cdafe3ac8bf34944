pub mod article;
pub mod client;

use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;

pub use article::{merge_articles, NewsArticle};
pub use client::{NewsDataClient, NewsSource, DEFAULT_NEWS_URL};

pub struct NewsCache {
    source: Option<Arc<dyn NewsSource>>,
    articles: RwLock<Vec<NewsArticle>>,
}

impl NewsCache {
    pub fn new(source: Option<Arc<dyn NewsSource>>) -> Self {
        if source.is_none() {
            warn!("No news source configured, news refresh disabled");
        }
        Self {
            source,
            articles: RwLock::new(Vec::new()),
        }
    }

    pub async fn refresh(&self) -> usize {
        let Some(source) = &self.source else {
            return self.articles.read().len();
        };

        match source.fetch_latest().await {
            Ok(fresh) => {
                let fetched = fresh.len();
                let mut articles = self.articles.write();
                let merged = merge_articles(&articles, fresh);
                *articles = merged;
                info!("News refreshed: {} fetched, {} cached", fetched, articles.len());
                articles.len()
            }
            Err(e) => {
                warn!("Error fetching finance news: {}", e);
                self.articles.read().len()
            }
        }
    }

    pub fn snapshot(&self) -> Vec<NewsArticle> {
        self.articles.read().clone()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    pub struct FakeNews {
        pub batches: Mutex<Vec<Result<Vec<NewsArticle>>>>,
    }

    impl FakeNews {
        pub fn new(batches: Vec<Result<Vec<NewsArticle>>>) -> Self {
            Self {
                batches: Mutex::new(batches),
            }
        }
    }

    #[async_trait]
    impl NewsSource for FakeNews {
        async fn fetch_latest(&self) -> Result<Vec<NewsArticle>> {
            let mut batches = self.batches.lock();
            if batches.is_empty() {
                return Err(Error::Config("no more batches".to_string()));
            }
            batches.remove(0)
        }
    }

    pub fn headline(title: &str, hour: u32) -> NewsArticle {
        use chrono::{TimeZone, Utc};
        NewsArticle {
            source: "Wire".to_string(),
            id: title.to_string(),
            title: title.to_string(),
            time_ago: "1 hour ago".to_string(),
            summary: String::new(),
            image_url: String::new(),
            url: String::new(),
            timestamp: Utc.with_ymd_and_hms(2024, 7, 10, hour, 0, 0).unwrap(),
            source_icon: String::new(),
        }
    }
}
