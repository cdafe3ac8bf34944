use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::news::article::{NewsArticle, RawArticle};

pub const DEFAULT_NEWS_URL: &str = "https://newsdata.io/api/1/latest";
const NEWS_QUERY: &str =
    "stock market OR wall street OR nasdaq OR s&p OR earnings OR inflation OR federal reserve";

#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsArticle>>;
}

#[derive(Debug, Deserialize)]
struct LatestNewsResponse {
    #[serde(default)]
    results: Option<Vec<RawArticle>>,
}

pub struct NewsDataClient {
    client: Client,
    url: String,
    api_key: String,
}

impl NewsDataClient {
    pub fn new(client: Client, url: &str, api_key: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl NewsSource for NewsDataClient {
    async fn fetch_latest(&self) -> Result<Vec<NewsArticle>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("q", NEWS_QUERY),
                ("category", "business"),
                ("language", "en"),
                ("country", "us"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let payload: LatestNewsResponse = response.json().await?;
        let now = Utc::now();
        let articles: Vec<NewsArticle> = payload
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| raw.into_article(now))
            .collect();

        debug!("Fetched {} news articles", articles.len());
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_without_results() {
        let payload: LatestNewsResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(payload.results.is_none());
    }

    #[test]
    fn test_response_with_results() {
        let payload: LatestNewsResponse = serde_json::from_str(
            r#"{"status":"success","totalResults":1,"results":[
                {"article_id":"1","title":"T","link":"L","pubDate":"2024-07-10 09:00:00","source_name":"S"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(payload.results.unwrap().len(), 1);
    }
}
