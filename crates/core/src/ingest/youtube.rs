use crate::config::{non_empty_var, var_or, Settings};
use crate::domain::video::VideoInfo;
use crate::http::HttpClient;
use crate::ingest::types::{SearchListResponse, SearchResult};
use anyhow::{Context, Result};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const DEFAULT_QUERY: &str = "錢線百分百";
const DEFAULT_MAX_RESULTS: u32 = 10;

/// Title marker for short-form uploads, matched case-insensitively.
const SHORTS_MARKER: &str = "#short";

#[async_trait::async_trait]
pub trait VideoSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn latest_video(&self) -> Result<VideoInfo>;
}

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    channel_id: Option<String>,
    query: Option<String>,
    max_results: u32,
}

impl YouTubeClient {
    pub fn from_settings(settings: &Settings, http: HttpClient) -> Result<Self> {
        let api_key = settings.require_youtube_api_key()?.to_string();
        let base_url =
            non_empty_var("YOUTUBE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let channel_id = non_empty_var("YOUTUBE_CHANNEL_ID");
        // Without a channel we can only search by show name.
        let query = non_empty_var("YOUTUBE_QUERY")
            .or_else(|| channel_id.is_none().then(|| DEFAULT_QUERY.to_string()));
        let max_results = var_or("YOUTUBE_MAX_RESULTS", DEFAULT_MAX_RESULTS).clamp(1, 50);

        Ok(Self {
            http,
            base_url,
            api_key,
            channel_id,
            query,
            max_results,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_channel(mut self, channel_id: Option<String>, query: Option<String>) -> Self {
        self.channel_id = channel_id;
        self.query = query;
        self
    }

    fn url(&self) -> String {
        format!("{}/youtube/v3/search", self.base_url.trim_end_matches('/'))
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("order", "date".to_string()),
            ("type", "video".to_string()),
            ("maxResults", self.max_results.to_string()),
            ("key", self.api_key.clone()),
        ];
        if let Some(channel_id) = &self.channel_id {
            params.push(("channelId", channel_id.clone()));
        }
        if let Some(q) = &self.query {
            params.push(("q", q.clone()));
        }
        params
    }
}

#[async_trait::async_trait]
impl VideoSource for YouTubeClient {
    fn source_name(&self) -> &'static str {
        "youtube_search"
    }

    async fn latest_video(&self) -> Result<VideoInfo> {
        let params = self.params();
        let parsed = self
            .http
            .get_json::<SearchListResponse>("youtube search", &self.url(), &params)
            .await?;

        let total = parsed.items.len();
        pick_latest(parsed.items)
            .with_context(|| format!("no qualifying video among {total} search results"))
    }
}

/// First long-form item in API order (newest first with `order=date`).
pub fn pick_latest(items: Vec<SearchResult>) -> Option<VideoInfo> {
    items.into_iter().find_map(|item| {
        let video_id = item.id.video_id.filter(|id| !id.trim().is_empty())?;
        let snippet = item.snippet?;
        let title = decode_entities(&snippet.title);
        if is_short_form(&title) {
            tracing::debug!(%video_id, %title, "skipping short-form video");
            return None;
        }

        Some(VideoInfo {
            link: VideoInfo::watch_url(&video_id),
            thumbnail_url: snippet.thumbnails.best_url().unwrap_or_default().to_string(),
            description: decode_entities(&snippet.description),
            published_at: snippet.published_at,
            title,
        })
    })
}

pub fn is_short_form(title: &str) -> bool {
    title.to_lowercase().contains(SHORTS_MARKER)
}

// search.list escapes snippet text as HTML.
fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
