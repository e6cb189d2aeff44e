use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";

lazy_static! {
    static ref ISO_DURATION_RE: Regex =
        Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("valid duration regex");
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

/// Converts `PT#H#M#S` into seconds. Returns `None` for anything else.
pub fn parse_iso8601_duration(value: &str) -> Option<i64> {
    let captures = ISO_DURATION_RE.captures(value.trim())?;
    if value.trim() == "PT" {
        return None;
    }
    let part = |index: usize| -> i64 {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0)
    };
    Some(part(1) * 3600 + part(2) * 60 + part(3))
}

/// Looks up video lengths through the YouTube Data API.
pub struct YoutubeService<'a> {
    http: &'a reqwest::Client,
    api_key: Option<&'a str>,
}

impl<'a> YoutubeService<'a> {
    pub fn new(http: &'a reqwest::Client, api_key: Option<&'a str>) -> Self {
        Self { http, api_key }
    }

    async fn fetch_duration(&self, api_key: &str, youtube_id: &str) -> Result<Option<i64>> {
        let response = self
            .http
            .get(VIDEOS_ENDPOINT)
            .query(&[("part", "contentDetails"), ("id", youtube_id), ("key", api_key)])
            .send()
            .await
            .context("Failed to call YouTube Data API")?;

        if !response.status().is_success() {
            anyhow::bail!("YouTube Data API returned status: {}", response.status());
        }

        let body: VideoListResponse = response
            .json()
            .await
            .context("Invalid YouTube Data API response")?;

        Ok(body
            .items
            .first()
            .and_then(|item| parse_iso8601_duration(&item.content_details.duration)))
    }

    /// Video length in seconds. Failures are logged and yield `None`.
    pub async fn duration_seconds(&self, youtube_id: &str) -> Option<i64> {
        let api_key = self.api_key.filter(|key| !key.trim().is_empty())?;

        match self.fetch_duration(api_key, youtube_id).await {
            Ok(duration) => duration,
            Err(e) => {
                tracing::warn!(youtube_id = %youtube_id, error = %e, "YouTube duration lookup failed");
                None
            }
        }
    }
}
