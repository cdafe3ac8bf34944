use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

pub const MAX_ARTICLES: usize = 20;
const SUMMARY_WORDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub source: String,
    pub id: String,
    pub title: String,
    #[serde(rename = "time")]
    pub time_ago: String,
    pub summary: String,
    #[serde(rename = "img")]
    pub image_url: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "src")]
    pub source_icon: String,
}

impl NewsArticle {
    fn dedup_key(&self) -> String {
        format!("{}||{}", self.source, self.title).to_lowercase()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArticle {
    pub article_id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "pubDate")]
    pub pub_date: Option<String>,
    pub image_url: Option<String>,
    pub source_name: Option<String>,
    pub source_icon: Option<String>,
}

impl RawArticle {
    pub fn into_article(self, now: DateTime<Utc>) -> Option<NewsArticle> {
        let published = match self.pub_date.as_deref().and_then(parse_pub_date) {
            Some(ts) => ts,
            None => {
                warn!("Dropping article {:?}: unparseable pubDate {:?}", self.title, self.pub_date);
                return None;
            }
        };

        Some(NewsArticle {
            source: non_empty(self.source_name).unwrap_or_else(|| "Unknown Source".to_string()),
            id: self.article_id.unwrap_or_default(),
            title: non_empty(self.title).unwrap_or_else(|| "Untitled".to_string()),
            time_ago: time_ago(published, now),
            summary: shorten(
                non_empty(self.description)
                    .as_deref()
                    .unwrap_or("No summary available."),
            ),
            image_url: self.image_url.unwrap_or_default(),
            url: self.link.unwrap_or_default(),
            timestamp: published,
            source_icon: self.source_icon.unwrap_or_default(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// NewsData.io sends `YYYY-MM-DD HH:MM:SS` in UTC
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn time_ago(published: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - published).num_minutes();
    let hours = minutes / 60;
    let days = hours / 24;

    if days >= 1 {
        if days == 1 { "1 day ago".to_string() } else { format!("{} days ago", days) }
    } else if hours >= 1 {
        if hours == 1 { "1 hour ago".to_string() } else { format!("{} hours ago", hours) }
    } else if minutes <= 1 {
        "1 minute ago".to_string()
    } else {
        format!("{} minutes ago", minutes)
    }
}

pub fn shorten(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= SUMMARY_WORDS {
        text.to_string()
    } else {
        format!("{}...", words[..SUMMARY_WORDS].join(" "))
    }
}

pub fn merge_articles(cached: &[NewsArticle], fresh: Vec<NewsArticle>) -> Vec<NewsArticle> {
    let mut seen: HashSet<String> = cached.iter().map(NewsArticle::dedup_key).collect();

    let mut merged: Vec<NewsArticle> = fresh
        .into_iter()
        .filter(|article| seen.insert(article.dedup_key()))
        .collect();
    merged.extend(cached.iter().cloned());

    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged.truncate(MAX_ARTICLES);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn article(source: &str, title: &str, minutes_old: i64) -> NewsArticle {
        let now = Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap();
        let timestamp = now - Duration::minutes(minutes_old);
        NewsArticle {
            source: source.to_string(),
            id: format!("{}-{}", source, minutes_old),
            title: title.to_string(),
            time_ago: time_ago(timestamp, now),
            summary: String::new(),
            image_url: String::new(),
            url: String::new(),
            timestamp,
            source_icon: String::new(),
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![article("Reuters", "Fed holds", 5), article("CNBC", "Stocks rally", 10)];

        let once = merge_articles(&[], batch.clone());
        let twice = merge_articles(&once, batch);

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 2);
    }

    #[test]
    fn test_merge_dedups_case_insensitively() {
        let cached = vec![article("Reuters", "Fed Holds Rates", 30)];
        let fresh = vec![
            article("reuters", "fed holds rates", 1),
            article("CNBC", "Oil slides", 2),
            article("cnbc", "OIL SLIDES", 3),
        ];

        let merged = merge_articles(&cached, fresh);
        let titles: Vec<&str> = merged.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Oil slides", "Fed Holds Rates"]);
    }

    #[test]
    fn test_merge_sorts_newest_first_and_caps() {
        let cached: Vec<NewsArticle> = (0..15)
            .map(|i| article("Old", &format!("old {}", i), 100 + i))
            .collect();
        let fresh: Vec<NewsArticle> = (0..15)
            .map(|i| article("New", &format!("new {}", i), i))
            .collect();

        let merged = merge_articles(&cached, fresh);
        assert_eq!(merged.len(), MAX_ARTICLES);
        assert!(merged.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(merged[0].title, "new 0");
        assert_eq!(merged.iter().filter(|a| a.source == "Old").count(), 5);
    }

    #[test]
    fn test_time_ago() {
        let now = Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap();
        assert_eq!(time_ago(now, now), "1 minute ago");
        assert_eq!(time_ago(now - Duration::minutes(45), now), "45 minutes ago");
        assert_eq!(time_ago(now - Duration::minutes(61), now), "1 hour ago");
        assert_eq!(time_ago(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(time_ago(now - Duration::hours(25), now), "1 day ago");
        assert_eq!(time_ago(now - Duration::days(3), now), "3 days ago");
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("short text"), "short text");
        let long = (1..=25).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let expected = (1..=20).map(|i| i.to_string()).collect::<Vec<_>>().join(" ") + "...";
        assert_eq!(shorten(&long), expected);
    }

    #[test]
    fn test_raw_article_normalisation() {
        let now = Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap();
        let raw: RawArticle = serde_json::from_str(
            r#"{"article_id":"a1","title":"Earnings beat","link":"https://x/y",
                "description":null,"pubDate":"2024-07-10 09:00:00",
                "image_url":null,"source_name":"","source_icon":"https://x/i.png"}"#,
        )
        .unwrap();

        let article = raw.into_article(now).unwrap();
        assert_eq!(article.source, "Unknown Source");
        assert_eq!(article.summary, "No summary available.");
        assert_eq!(article.time_ago, "3 hours ago");
        assert_eq!(article.timestamp, Utc.with_ymd_and_hms(2024, 7, 10, 9, 0, 0).unwrap());

        let bad = RawArticle {
            pub_date: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(bad.into_article(now).is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(article("Reuters", "Fed holds", 5)).unwrap();
        for key in ["source", "id", "title", "time", "summary", "img", "url", "timestamp", "src"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
