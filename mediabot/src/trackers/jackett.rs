//! Jackett torrent indexer proxy.
//!
//! Uses the JSON results endpoint
//! `/api/v2.0/indexers/{indexer}/results?apikey=..&Query=..`.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Candidate, TorrentFile, TrackerBackend};
use crate::config::JackettConfig;
use crate::utils::url::{extract_host, first_number};
use crate::{Error, Result};

const TRACKER_NAME: &str = "jackett";

static RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(2160|1080|720)[pi]?\b").unwrap());

/// Title keywords mapped to audio language tags.
const AUDIO_KEYWORDS: &[(&str, &str)] = &[
    ("rus", "RUSSIAN"),
    ("dub", "RUSSIAN"),
    ("mvo", "RUSSIAN"),
    ("dvo", "RUSSIAN"),
    ("дубляж", "RUSSIAN"),
    ("eng", "ENGLISH"),
    ("original", "ENGLISH"),
];

const ADVERT_KEYWORDS: &[&str] = &["реклама", "advert", "ads"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<JackettResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JackettResult {
    title: String,
    link: Option<String>,
    details: Option<String>,
    #[serde(default)]
    size: u64,
    seeders: Option<u32>,
    files: Option<u32>,
    imdb: Option<u64>,
    #[serde(rename = "TMDb")]
    tmdb: Option<u64>,
}

/// Tracker backed by a Jackett instance.
pub struct JackettTracker {
    config: JackettConfig,
    client: Client,
}

impl JackettTracker {
    pub fn new(config: JackettConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn results_url(&self) -> String {
        format!(
            "{}/api/v2.0/indexers/{}/results",
            self.config.url.trim_end_matches('/'),
            self.config.indexer
        )
    }
}

#[async_trait]
impl TrackerBackend for JackettTracker {
    fn name(&self) -> &str {
        TRACKER_NAME
    }

    fn accepts(&self, url: &str) -> bool {
        match (extract_host(url), extract_host(&self.config.url)) {
            (Some(host), Some(own)) => host == own,
            _ => false,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        let response = self
            .client
            .get(self.results_url())
            .query(&[("apikey", self.config.api_key.as_str()), ("Query", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::tracker(
                TRACKER_NAME,
                format!("search returned HTTP {}", response.status()),
            ));
        }

        let body: SearchResponse = response.json().await?;
        let candidates: Vec<Candidate> = body
            .results
            .into_iter()
            .filter_map(into_candidate)
            .collect();
        debug!(query, count = candidates.len(), "Jackett results parsed");
        Ok(candidates)
    }

    async fn fetch(&self, url: &str) -> Result<TorrentFile> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::tracker(
                TRACKER_NAME,
                format!("download returned HTTP {}", response.status()),
            ));
        }
        let data = response.bytes().await?;

        Ok(TorrentFile {
            id: first_number(url).unwrap_or_default().to_string(),
            data,
        })
    }
}

/// Results without a download link cannot be fetched and are skipped.
fn into_candidate(result: JackettResult) -> Option<Candidate> {
    let source_url = result.link.filter(|link| !link.is_empty())?;
    let tags = TitleTags::parse(&result.title);

    Some(Candidate {
        detail_url: result.details.unwrap_or_else(|| source_url.clone()),
        source_url,
        size_gb: result.size as f64 / 1e9,
        seeders: result.seeders.unwrap_or(0),
        resolution: tags.resolution,
        audio: tags.audio,
        subtitles: tags.subtitles,
        advert: tags.advert,
        file_count: result.files.filter(|&n| n > 0).unwrap_or(1),
        tracker: TRACKER_NAME.to_string(),
        catalog_id: result.imdb.or(result.tmdb).filter(|&id| id > 0),
        label: result.title,
    })
}

/// Release attributes recognized from a title.
#[derive(Debug, Default, PartialEq)]
struct TitleTags {
    resolution: Option<u32>,
    audio: Vec<String>,
    subtitles: Vec<String>,
    advert: bool,
}

impl TitleTags {
    fn parse(title: &str) -> Self {
        let mut tags = Self {
            resolution: RESOLUTION_RE
                .captures(title)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok()),
            ..Default::default()
        };

        let tokens: Vec<String> = title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut after_sub = false;
        for token in &tokens {
            if token == "sub" || token == "subs" {
                after_sub = true;
                continue;
            }
            if let Some((_, lang)) = AUDIO_KEYWORDS.iter().find(|(k, _)| *k == token.as_str()) {
                let target = if after_sub {
                    &mut tags.subtitles
                } else {
                    &mut tags.audio
                };
                if !target.iter().any(|t| t.as_str() == *lang) {
                    target.push(lang.to_string());
                }
            }
            after_sub = false;
            if ADVERT_KEYWORDS.contains(&token.as_str()) {
                tags.advert = true;
            }
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_tags() {
        let tags = TitleTags::parse("Heat (1995) BDRip 1080p | Dub, Eng | Sub Rus");
        assert_eq!(tags.resolution, Some(1080));
        assert_eq!(tags.audio, vec!["RUSSIAN", "ENGLISH"]);
        assert_eq!(tags.subtitles, vec!["RUSSIAN"]);
        assert!(!tags.advert);

        let tags = TitleTags::parse("Heat 1995 WEB-DL 720p реклама");
        assert_eq!(tags.resolution, Some(720));
        assert!(tags.audio.is_empty());
        assert!(tags.advert);
    }

    #[test]
    fn test_parse_results() {
        let raw = r#"{
            "Results": [
                {
                    "Title": "Dark S02 1080p MVO",
                    "Link": "http://jackett:9117/dl/tracker/?path=991",
                    "Details": "https://tracker.org/t/991",
                    "Size": 12500000000,
                    "Seeders": 42,
                    "Files": 8,
                    "Imdb": 5753856,
                    "TMDb": null
                },
                { "Title": "magnet only", "Link": null, "Size": 1 }
            ],
            "Indexers": []
        }"#;

        let body: SearchResponse = serde_json::from_str(raw).unwrap();
        let candidates: Vec<_> = body.results.into_iter().filter_map(into_candidate).collect();
        assert_eq!(candidates.len(), 1);

        let c = &candidates[0];
        assert_eq!(c.seeders, 42);
        assert_eq!(c.file_count, 8);
        assert_eq!(c.catalog_id, Some(5753856));
        assert!((c.size_gb - 12.5).abs() < f64::EPSILON);
        assert!(c.has_audio("russian"));
        assert_eq!(c.detail_url, "https://tracker.org/t/991");
        assert_eq!(c.tracker, "jackett");
    }

    #[test]
    fn test_accepts_own_host_only() {
        let tracker = JackettTracker::new(
            JackettConfig {
                url: "http://jackett:9117".to_string(),
                api_key: "k".to_string(),
                indexer: "all".to_string(),
            },
            crate::utils::http_client::build_client(None, std::time::Duration::ZERO).unwrap(),
        );
        assert!(tracker.accepts("http://jackett:9117/dl/x/?path=1"));
        assert!(!tracker.accepts("https://tracker.org/t/1"));
        assert_eq!(
            tracker.results_url(),
            "http://jackett:9117/api/v2.0/indexers/all/results"
        );
    }
}
